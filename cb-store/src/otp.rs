//! The OTP store: primary backend + in-memory fallback with janitor.
//!
//! One-time codes are 6 decimal digits with a 5-minute TTL and at most one
//! active code per email (a new issue replaces the old code). The primary
//! backend is Redis in production, reached through [`OtpBackend`]; when it
//! errors, the store falls back to an in-process map guarded by a
//! reader/writer lock, swept by a janitor task once a minute. In the
//! development environment the canonical code `123456` is always accepted
//! and no transport is exercised.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use cb_common::{rng::Crng, time::TimestampMs};
use cb_core::config::DeployEnv;
use cb_tokio::{notify_once::NotifyOnce, task::CbTask};
use tracing::{debug, info, warn};

/// Code lifetime.
pub const OTP_TTL: Duration = Duration::from_secs(5 * 60);
/// The code accepted unconditionally in the development environment.
pub const DEV_OTP_CODE: &str = "123456";
/// How often the fallback janitor sweeps expired entries.
const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// A stored one-time code.
#[derive(Clone, Debug)]
pub struct OtpEntry {
    pub code: String,
    pub expires_at: TimestampMs,
}

impl OtpEntry {
    fn is_expired(&self, now: TimestampMs) -> bool {
        now >= self.expires_at
    }
}

/// The primary OTP backend contract (Redis in production).
#[async_trait]
pub trait OtpBackend: Send + Sync {
    async fn put(&self, email: &str, entry: OtpEntry)
        -> anyhow::Result<()>;

    async fn get(&self, email: &str) -> anyhow::Result<Option<OtpEntry>>;

    /// Removes the entry, making a successful verification one-shot.
    async fn delete(&self, email: &str) -> anyhow::Result<()>;
}

/// The in-memory fallback map.
#[derive(Default)]
struct FallbackMap {
    entries: RwLock<HashMap<String, OtpEntry>>,
}

impl FallbackMap {
    fn put(&self, email: &str, entry: OtpEntry) {
        self.entries
            .write()
            .expect("otp lock poisoned")
            .insert(email.to_owned(), entry);
    }

    fn get(&self, email: &str) -> Option<OtpEntry> {
        self.entries
            .read()
            .expect("otp lock poisoned")
            .get(email)
            .cloned()
    }

    fn delete(&self, email: &str) {
        self.entries
            .write()
            .expect("otp lock poisoned")
            .remove(email);
    }

    /// Removes expired entries; returns how many were swept.
    fn sweep(&self, now: TimestampMs) -> usize {
        let mut entries =
            self.entries.write().expect("otp lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

/// See the module docs.
pub struct OtpStore {
    primary: Option<Arc<dyn OtpBackend>>,
    fallback: Arc<FallbackMap>,
    deploy_env: DeployEnv,
}

impl OtpStore {
    pub fn new(
        primary: Option<Arc<dyn OtpBackend>>,
        deploy_env: DeployEnv,
    ) -> Self {
        Self {
            primary,
            fallback: Arc::new(FallbackMap::default()),
            deploy_env,
        }
    }

    /// Issues a fresh 6-digit code for the email, replacing any active
    /// one. The caller hands the code to the OTP transport.
    pub async fn issue(
        &self,
        rng: &mut impl Crng,
        email: &str,
    ) -> String {
        let code = format!("{:06}", rng.next_u32() % 1_000_000);
        let entry = OtpEntry {
            code: code.clone(),
            expires_at: TimestampMs::now().saturating_add(OTP_TTL),
        };

        if let Some(primary) = &self.primary {
            match primary.put(email, entry.clone()).await {
                Ok(()) => return code,
                Err(e) => {
                    warn!("OTP primary store put failed: {e:#}; \
                           using in-memory fallback");
                }
            }
        }
        self.fallback.put(email, entry);
        code
    }

    /// Verifies a code. Expired or unknown codes fail; a successful
    /// verification consumes the code, a failed attempt leaves it in
    /// place for retry within the TTL.
    pub async fn verify(&self, email: &str, code: &str) -> bool {
        // Development environments accept the canonical code without a
        // store round-trip.
        if self.deploy_env.is_dev() && code == DEV_OTP_CODE {
            return true;
        }

        let mut use_fallback = self.primary.is_none();
        let entry = match &self.primary {
            Some(primary) => match primary.get(email).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("OTP primary store get failed: {e:#}; \
                           using in-memory fallback");
                    use_fallback = true;
                    self.fallback.get(email)
                }
            },
            None => self.fallback.get(email),
        };

        let Some(entry) = entry else { return false };
        if entry.is_expired(TimestampMs::now()) {
            debug!("Rejected expired OTP for {email}");
            self.delete(email, use_fallback).await;
            return false;
        }
        if entry.code != code {
            return false;
        }

        self.delete(email, use_fallback).await;
        true
    }

    async fn delete(&self, email: &str, use_fallback: bool) {
        if !use_fallback {
            if let Some(primary) = &self.primary {
                if let Err(e) = primary.delete(email).await {
                    warn!("OTP primary store delete failed: {e:#}");
                }
                return;
            }
        }
        self.fallback.delete(email);
    }

    /// Spawns the janitor that sweeps expired fallback entries once a
    /// minute until `shutdown` fires.
    pub fn spawn_janitor(&self, mut shutdown: NotifyOnce) -> CbTask<()> {
        let fallback = self.fallback.clone();
        CbTask::spawn("otp janitor", async move {
            let mut ticks = tokio::time::interval(JANITOR_INTERVAL);
            ticks.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );

            loop {
                tokio::select! {
                    // Mitigate possible select! race after a shutdown
                    biased;
                    () = shutdown.recv() => break,
                    _ = ticks.tick() => {
                        let swept = fallback.sweep(TimestampMs::now());
                        if swept > 0 {
                            debug!("OTP janitor swept {swept} entries");
                        }
                    }
                }
            }

            info!("OTP janitor shut down");
        })
    }
}
