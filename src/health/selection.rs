use crate::domain::processor::{ProcessorHealth, ProcessorId};

/// Latency tolerance under which a processor is considered fast enough.
pub const TOLERANCE_MS: u64 = 150;

/// Picks the processor to route to. Default is cheaper, so it wins unless it
/// is failing or clearly slower than a healthy, fast Fallback.
pub fn select_active(default: &ProcessorHealth, fallback: &ProcessorHealth) -> Option<ProcessorId> {
    if default.failing {
        return if fallback.failing {
            None
        } else {
            Some(ProcessorId::Fallback)
        };
    }

    if default.min_response_time <= TOLERANCE_MS
        || fallback.failing
        || default.min_response_time == fallback.min_response_time
    {
        return Some(ProcessorId::Default);
    }

    if fallback.min_response_time <= TOLERANCE_MS {
        return Some(ProcessorId::Fallback);
    }

    Some(ProcessorId::Default)
}
