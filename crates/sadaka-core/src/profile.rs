//! Payer Profile Store
//!
//! Manages the mobile-money numbers a payer sends from. Mutations for one
//! payer are serialized behind that payer's async mutex, so two concurrent
//! calls can never leave two defaults (or none when a verified number exists).
//! Different payers never contend. Reads go straight to the store.

use crate::store::SenderNumberStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use sadaka_types::{PayerId, PhoneNumber, Result, SadakaError, SenderNumber, SenderNumberId};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Digits in a verification code
pub const CODE_LENGTH: usize = 6;

/// Delivers verification codes to the handset
#[async_trait]
pub trait VerificationDispatcher: Send + Sync {
    async fn dispatch(&self, phone: &PhoneNumber, code: &str) -> Result<()>;
}

/// Dispatcher that only logs the code. For development.
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatcher;

#[async_trait]
impl VerificationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, phone: &PhoneNumber, code: &str) -> Result<()> {
        debug!(phone = %phone.masked(), code, "Verification code issued");
        Ok(())
    }
}

struct IssuedCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Sender-number management for all payers
pub struct PayerProfileStore {
    store: Arc<dyn SenderNumberStore>,
    dispatcher: Arc<dyn VerificationDispatcher>,
    locks: DashMap<PayerId, Arc<Mutex<()>>>,
    codes: DashMap<SenderNumberId, IssuedCode>,
    code_ttl: Duration,
}

impl PayerProfileStore {
    pub fn new(
        store: Arc<dyn SenderNumberStore>,
        dispatcher: Arc<dyn VerificationDispatcher>,
        code_ttl: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks: DashMap::new(),
            codes: DashMap::new(),
            code_ttl,
        }
    }

    async fn lock_payer(&self, payer_id: &PayerId) -> PayerGuard<'_> {
        let lock = self.locks.entry(payer_id.clone()).or_default().clone();
        PayerGuard {
            locks: &self.locks,
            payer_id: payer_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Register a number for the payer
    ///
    /// Returns as soon as the number is stored; the verification code is
    /// delivered in the background.
    pub async fn add_sender_number(&self, payer_id: &PayerId, raw_phone: &str) -> Result<SenderNumber> {
        let phone = PhoneNumber::normalize(raw_phone)?;

        let _guard = self.lock_payer(payer_id).await;

        let mut numbers = self.store.load(payer_id).await?;
        if numbers.iter().any(|n| n.phone_number == phone) {
            return Err(SadakaError::DuplicateSenderNumber {
                phone: phone.to_e164(),
            });
        }

        let number = SenderNumber::new(payer_id.clone(), phone, numbers.is_empty());
        numbers.push(number.clone());
        self.store.save(payer_id, numbers).await?;

        info!(
            payer_id = %payer_id,
            sender_id = %number.id,
            phone = %number.phone_number.masked(),
            is_default = number.is_default,
            "Sender number added"
        );

        self.issue_code(&number);
        Ok(number)
    }

    /// Issue a fresh code for an unverified number
    pub async fn resend_verification_code(
        &self,
        payer_id: &PayerId,
        id: SenderNumberId,
    ) -> Result<SenderNumber> {
        let number = self.get_sender_number(payer_id, id).await?;
        if number.is_verified {
            debug!(sender_id = %id, "Number already verified, no code sent");
        } else {
            self.issue_code(&number);
        }
        Ok(number)
    }

    /// Confirm ownership of a number with the dispatched code
    pub async fn verify_sender_number(
        &self,
        payer_id: &PayerId,
        id: SenderNumberId,
        code: &str,
    ) -> Result<SenderNumber> {
        let _guard = self.lock_payer(payer_id).await;

        let mut numbers = self.store.load(payer_id).await?;
        let index = position(&numbers, id)?;
        if numbers[index].is_verified {
            return Ok(numbers[index].clone());
        }

        self.check_code(id, code)?;

        let now = Utc::now();
        numbers[index].is_verified = true;
        numbers[index].verified_at = Some(now);

        if !numbers.iter().any(SenderNumber::is_usable_default) {
            for (i, number) in numbers.iter_mut().enumerate() {
                number.is_default = i == index;
            }
        }

        let verified = numbers[index].clone();
        self.store.save(payer_id, numbers).await?;

        info!(
            payer_id = %payer_id,
            sender_id = %id,
            is_default = verified.is_default,
            "Sender number verified"
        );
        Ok(verified)
    }

    /// Remove a number, promoting the oldest verified one if it was the default
    pub async fn remove_sender_number(&self, payer_id: &PayerId, id: SenderNumberId) -> Result<()> {
        let _guard = self.lock_payer(payer_id).await;

        let mut numbers = self.store.load(payer_id).await?;
        let index = position(&numbers, id)?;
        let removed = numbers.remove(index);
        self.codes.remove(&id);

        let mut promoted = None;
        if removed.is_default {
            if let Some(next) = numbers.iter_mut().find(|n| n.is_verified) {
                next.is_default = true;
                promoted = Some(next.id);
            }
        }

        self.store.save(payer_id, numbers).await?;

        info!(
            payer_id = %payer_id,
            sender_id = %id,
            promoted = ?promoted,
            "Sender number removed"
        );
        Ok(())
    }

    /// Make a verified number the default
    pub async fn set_default_sender_number(
        &self,
        payer_id: &PayerId,
        id: SenderNumberId,
    ) -> Result<SenderNumber> {
        let _guard = self.lock_payer(payer_id).await;

        let mut numbers = self.store.load(payer_id).await?;
        let index = position(&numbers, id)?;
        if !numbers[index].is_verified {
            return Err(SadakaError::NotVerified {
                sender_id: id.to_string(),
            });
        }

        for (i, number) in numbers.iter_mut().enumerate() {
            number.is_default = i == index;
        }
        let chosen = numbers[index].clone();
        self.store.save(payer_id, numbers).await?;

        debug!(payer_id = %payer_id, sender_id = %id, "Default sender number changed");
        Ok(chosen)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The number payments are sent from, if the payer has a verified one
    pub async fn get_default_sender_number(&self, payer_id: &PayerId) -> Result<Option<SenderNumber>> {
        let numbers = self.store.load(payer_id).await?;
        let default = numbers
            .iter()
            .find(|n| n.is_usable_default())
            .or_else(|| numbers.iter().find(|n| n.is_verified))
            .cloned();
        Ok(default)
    }

    /// All registered numbers, oldest first
    pub async fn list_sender_numbers(&self, payer_id: &PayerId) -> Result<Vec<SenderNumber>> {
        self.store.load(payer_id).await
    }

    pub async fn get_sender_number(&self, payer_id: &PayerId, id: SenderNumberId) -> Result<SenderNumber> {
        let numbers = self.store.load(payer_id).await?;
        let index = position(&numbers, id)?;
        Ok(numbers[index].clone())
    }

    // =========================================================================
    // Verification codes
    // =========================================================================

    fn issue_code(&self, number: &SenderNumber) {
        let code = generate_code();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.code_ttl).unwrap_or_else(|_| chrono::Duration::minutes(10));
        self.codes.insert(
            number.id,
            IssuedCode {
                code: code.clone(),
                expires_at,
            },
        );

        let dispatcher = self.dispatcher.clone();
        let phone = number.phone_number.clone();
        let sender_id = number.id;
        tokio::spawn(async move {
            if let Err(err) = dispatcher.dispatch(&phone, &code).await {
                warn!(sender_id = %sender_id, error = %err, "Failed to deliver verification code");
            }
        });
    }

    fn check_code(&self, id: SenderNumberId, code: &str) -> Result<()> {
        let invalid = || SadakaError::InvalidCode {
            sender_id: id.to_string(),
        };

        let Some((_, issued)) = self.codes.remove(&id) else {
            return Err(invalid());
        };

        if issued.expires_at <= Utc::now() {
            return Err(invalid());
        }
        if !constant_time_compare(code.trim(), &issued.code) {
            // Keep the code so the payer can correct a typo
            self.codes.insert(id, issued);
            return Err(invalid());
        }
        Ok(())
    }
}

/// Holds a payer's mutation lock; drops the map entry once nobody else wants it
struct PayerGuard<'a> {
    locks: &'a DashMap<PayerId, Arc<Mutex<()>>>,
    payer_id: PayerId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PayerGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone, so a count of one means the map owns the only handle
        self.locks
            .remove_if(&self.payer_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn position(numbers: &[SenderNumber], id: SenderNumberId) -> Result<usize> {
    numbers
        .iter()
        .position(|n| n.id == id)
        .ok_or_else(|| SadakaError::SenderNumberNotFound {
            sender_id: id.to_string(),
        })
}

fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..10u32.pow(CODE_LENGTH as u32));
    format!("{value:0width$}", width = CODE_LENGTH)
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
