//! Cache-backed pause switches. Thin facade over Redis; a missing key means
//! "not paused", and pausing is eventually consistent with in-flight ticks.

use crate::config::PauseDefaults;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseFlag {
    Purchase,
    Rebalance,
    Ondemand,
}

impl PauseFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Rebalance => "rebalance",
            Self::Ondemand => "ondemand",
        }
    }

    fn key(&self) -> String {
        format!("mark:pause:{self}")
    }
}

impl std::fmt::Display for PauseFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PauseFlag {
    type Err = UnknownPauseFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "rebalance" => Ok(Self::Rebalance),
            "ondemand" => Ok(Self::Ondemand),
            other => Err(UnknownPauseFlag(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown pause flag `{0}`")]
pub struct UnknownPauseFlag(pub String);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("pause flag `{flag}` is already set to {paused}")]
    AlreadySet { flag: PauseFlag, paused: bool },
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Read/write access to the pause switches.
#[async_trait]
pub trait PauseStore: Send + Sync {
    async fn is_paused(&self, flag: PauseFlag) -> Result<bool, CacheError>;

    /// Flip a flag. Setting a flag to its current value is an error so the
    /// admin surface can report it.
    async fn set_pause(&self, flag: PauseFlag, paused: bool) -> Result<(), CacheError>;

    /// Apply startup defaults without failing on flags already in place.
    async fn apply_defaults(&self, defaults: &PauseDefaults) -> Result<(), CacheError> {
        for (flag, paused) in [
            (PauseFlag::Purchase, defaults.purchase),
            (PauseFlag::Rebalance, defaults.rebalance),
            (PauseFlag::Ondemand, defaults.ondemand),
        ] {
            if paused {
                match self.set_pause(flag, true).await {
                    Ok(()) | Err(CacheError::AlreadySet { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }
}

/// Redis-backed pause store shared across instances.
#[derive(Clone)]
pub struct PauseGate {
    con: MultiplexedConnection,
}

impl PauseGate {
    pub fn new(con: MultiplexedConnection) -> Self {
        Self { con }
    }

    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let con = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(con))
    }
}

#[async_trait]
impl PauseStore for PauseGate {
    async fn is_paused(&self, flag: PauseFlag) -> Result<bool, CacheError> {
        let mut con = self.con.clone();
        let value: Option<String> = con.get(flag.key()).await?;
        Ok(value.is_some())
    }

    async fn set_pause(&self, flag: PauseFlag, paused: bool) -> Result<(), CacheError> {
        let mut con = self.con.clone();
        if self.is_paused(flag).await? == paused {
            return Err(CacheError::AlreadySet { flag, paused });
        }
        if paused {
            con.set::<_, _, ()>(flag.key(), "1").await?;
        } else {
            con.del::<_, ()>(flag.key()).await?;
        }
        Ok(())
    }
}

/// Process-local pause store for tests and cache-less local runs.
#[derive(Clone, Default)]
pub struct MemoryPauses {
    paused: Arc<Mutex<HashSet<PauseFlag>>>,
}

impl MemoryPauses {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PauseStore for MemoryPauses {
    async fn is_paused(&self, flag: PauseFlag) -> Result<bool, CacheError> {
        Ok(self.paused.lock().contains(&flag))
    }

    async fn set_pause(&self, flag: PauseFlag, paused: bool) -> Result<(), CacheError> {
        let mut set = self.paused.lock();
        let currently = set.contains(&flag);
        if currently == paused {
            return Err(CacheError::AlreadySet { flag, paused });
        }
        if paused {
            set.insert(flag);
        } else {
            set.remove(&flag);
        }
        Ok(())
    }
}
