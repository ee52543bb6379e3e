//! Fault injection
//!
//! Parsed from `fault.*` component params:
//!
//! | param            | value                         |
//! |------------------|-------------------------------|
//! | `fault.fail`     | `always` or `every:N`         |
//! | `fault.fail_at`  | comma-separated timestamps    |
//! | `fault.delay_ms` | sleep before processing       |
//! | `fault.hang`     | `true` never returns          |

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use contracts::Timestamp;

use crate::error::{Result, SandboxError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_always: bool,
    /// Fail every Nth invocation (1-based)
    pub fail_every: Option<u64>,
    /// Fail at these simulated times
    pub fail_at: BTreeSet<Timestamp>,
    pub delay: Option<Duration>,
    pub hang: bool,
}

impl FaultPlan {
    pub fn from_params(component: &str, params: &HashMap<String, String>) -> Result<Self> {
        let mut plan = Self::default();

        if let Some(fail) = params.get("fault.fail") {
            match fail.trim() {
                "always" => plan.fail_always = true,
                "never" => {}
                other => {
                    let n = other
                        .strip_prefix("every:")
                        .and_then(|n| n.parse::<u64>().ok())
                        .filter(|&n| n > 0)
                        .ok_or_else(|| {
                            SandboxError::invalid_param(
                                component,
                                "fault.fail",
                                format!("expected 'always', 'never' or 'every:N', got '{other}'"),
                            )
                        })?;
                    plan.fail_every = Some(n);
                }
            }
        }

        if let Some(list) = params.get("fault.fail_at") {
            for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let at = item.parse::<Timestamp>().map_err(|e| {
                    SandboxError::invalid_param(component, "fault.fail_at", format!("'{item}': {e}"))
                })?;
                plan.fail_at.insert(at);
            }
        }

        if let Some(ms) = params.get("fault.delay_ms") {
            let ms = ms.trim().parse::<u64>().map_err(|e| {
                SandboxError::invalid_param(component, "fault.delay_ms", e.to_string())
            })?;
            plan.delay = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(hang) = params.get("fault.hang") {
            plan.hang = hang.trim().parse::<bool>().map_err(|e| {
                SandboxError::invalid_param(component, "fault.hang", e.to_string())
            })?;
        }

        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether invocation number `n` (1-based) at simulated time `at` fails.
    pub fn fails(&self, n: u64, at: Timestamp) -> bool {
        self.fail_always
            || self.fail_at.contains(&at)
            || self.fail_every.is_some_and(|every| n % every == 0)
    }
}
