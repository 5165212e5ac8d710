// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fault injection policy + runtime controller for the persisted store

use crate::error::{FsError, FsResult};
use libc::{EIO, ENOSPC};
use serde::{Deserialize, Serialize};
use std::io;

/// Store operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    StoreRead,
    StoreWrite,
    StoreSync,
    StoreRename,
}

/// Supported errno values for synthetic failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultErrno {
    Eio,
    Enospc,
}

impl FaultErrno {
    fn to_error(self) -> FsError {
        match self {
            FaultErrno::Eio => FsError::Io(io::Error::from_raw_os_error(EIO)),
            FaultErrno::Enospc => FsError::Io(io::Error::from_raw_os_error(ENOSPC)),
        }
    }
}

/// Individual rule describing which op should fail and how often.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    pub errno: FaultErrno,
    /// Number of leading invocations to let through before injecting faults.
    #[serde(default)]
    pub start_after: u64,
    /// Maximum number of injected failures for this rule.
    #[serde(default)]
    pub max_faults: Option<u64>,
}

impl FaultRule {
    /// A rule failing every invocation of `op` with EIO.
    pub fn always(op: FaultOp) -> Self {
        Self {
            op,
            errno: FaultErrno::Eio,
            start_after: 0,
            max_faults: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn single(rule: FaultRule) -> Self {
        Self {
            enabled: true,
            rules: vec![rule],
        }
    }
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

/// Runtime controller that tracks policy + hit counts.
#[derive(Debug, Default)]
pub struct FaultInjector {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_policy(&mut self, policy: FaultPolicy) {
        self.counters = vec![RuleCounters::default(); policy.rules.len()];
        self.policy = policy;
    }

    pub fn clear(&mut self) {
        self.set_policy(FaultPolicy::default());
    }

    pub fn should_fault(&mut self, op: FaultOp) -> Option<FsError> {
        if !self.policy.enabled {
            return None;
        }
        for (rule, counters) in self.policy.rules.iter().zip(self.counters.iter_mut()) {
            if rule.op != op {
                continue;
            }
            counters.invocations = counters.invocations.saturating_add(1);
            if counters.invocations <= rule.start_after {
                continue;
            }
            if let Some(max) = rule.max_faults {
                if counters.hits >= max {
                    continue;
                }
            }
            counters.hits = counters.hits.saturating_add(1);
            tracing::debug!(?op, errno = ?rule.errno, "injecting store fault");
            return Some(rule.errno.to_error());
        }
        None
    }

    /// `Err` when a fault fires for `op`.
    pub fn check(&mut self, op: FaultOp) -> FsResult<()> {
        match self.should_fault(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fault_policy_json() {
        let json = br#"{ "enabled": true, "rules": [ { "op": "store_rename", "errno": "enospc", "max_faults": 2 } ] }"#;
        let policy = FaultPolicy::from_json_bytes(json).expect("policy");
        assert!(policy.enabled);
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].op, FaultOp::StoreRename);
        assert_eq!(policy.rules[0].max_faults, Some(2));
    }

    #[test]
    fn injector_respects_start_and_max_hits() {
        let mut injector = FaultInjector::new();
        injector.set_policy(FaultPolicy::single(FaultRule {
            op: FaultOp::StoreWrite,
            errno: FaultErrno::Eio,
            start_after: 1,
            max_faults: Some(2),
        }));

        // First call skipped due to start_after
        assert!(injector.check(FaultOp::StoreWrite).is_ok());
        assert!(injector.check(FaultOp::StoreWrite).is_err());
        assert!(injector.check(FaultOp::StoreWrite).is_err());
        // Max hits reached
        assert!(injector.check(FaultOp::StoreWrite).is_ok());
        // Other ops never fault
        assert!(injector.check(FaultOp::StoreRead).is_ok());
    }

    #[test]
    fn enospc_maps_to_io_error() {
        let mut injector = FaultInjector::new();
        injector.set_policy(FaultPolicy::single(FaultRule {
            errno: FaultErrno::Enospc,
            ..FaultRule::always(FaultOp::StoreSync)
        }));
        match injector.check(FaultOp::StoreSync) {
            Err(FsError::Io(err)) => assert_eq!(err.raw_os_error(), Some(ENOSPC)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn disabled_policy_never_faults() {
        let mut injector = FaultInjector::new();
        injector.set_policy(FaultPolicy {
            enabled: false,
            rules: vec![FaultRule::always(FaultOp::StoreWrite)],
        });
        assert!(injector.should_fault(FaultOp::StoreWrite).is_none());
    }
}
