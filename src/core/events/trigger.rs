use crate::core::components::ComponentHandle;
use crate::core::config::TriggerMode;
use crate::core::connections::SignalPath;
use crate::core::events::predicate::Predicate;

/// Tolerance when comparing tick times against trigger times
const TIME_EPSILON: f64 = 1e-9;

/// Compiled event trigger
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fires once, on the first tick with `t >= at`
    Time { at: f64, fired: bool },
    /// Fires on the rising edge of the predicate, or on every true tick in level mode
    Condition {
        predicate: Predicate<SignalPath>,
        mode: TriggerMode,
        was_true: bool,
    },
}

impl Trigger {
    pub fn at(at: f64) -> Self {
        Trigger::Time { at, fired: false }
    }

    pub fn condition(predicate: Predicate<SignalPath>, mode: TriggerMode) -> Self {
        Trigger::Condition {
            predicate,
            mode,
            was_true: false,
        }
    }

    /// Evaluate for the tick at `t`; returns true when the event fires
    pub fn poll(&mut self, t: f64, dt: f64, components: &[ComponentHandle]) -> bool {
        match self {
            Trigger::Time { at, fired } => {
                if *fired || t + TIME_EPSILON * at.abs().max(1.0) < *at {
                    return false;
                }
                *fired = true;
                true
            }
            Trigger::Condition {
                predicate,
                mode,
                was_true,
            } => {
                let now = predicate.evaluate(&|path: &SignalPath| path.read(t, dt, components));
                let fire = match mode {
                    TriggerMode::Edge => now && !*was_true,
                    TriggerMode::Level => now,
                };
                *was_true = now;
                fire
            }
        }
    }
}
