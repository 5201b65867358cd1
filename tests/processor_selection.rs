use payments_router::domain::processor::{ProcessorHealth, ProcessorId};
use payments_router::health::selection::select_active;

fn h(failing: bool, ms: u64) -> ProcessorHealth {
    ProcessorHealth {
        failing,
        min_response_time: ms,
        last_checked: chrono::Utc::now(),
    }
}

#[test]
fn fast_default_beats_unreachable_fallback() {
    assert_eq!(select_active(&h(false, 50), &h(false, 9999)), Some(ProcessorId::Default));
}

#[test]
fn slow_default_yields_to_fast_fallback() {
    assert_eq!(select_active(&h(false, 300), &h(false, 60)), Some(ProcessorId::Fallback));
}

#[test]
fn both_failing_selects_nothing() {
    assert_eq!(select_active(&h(true, 0), &h(true, 0)), None);
}

#[test]
fn failing_default_routes_to_healthy_fallback_regardless_of_latency() {
    assert_eq!(select_active(&h(true, 10), &h(false, 5000)), Some(ProcessorId::Fallback));
}

#[test]
fn failing_fallback_keeps_slow_default() {
    assert_eq!(select_active(&h(false, 2000), &h(true, 10)), Some(ProcessorId::Default));
}

#[test]
fn selection_matches_priority_rules_over_grid() {
    let latencies = [0u64, 60, 149, 150, 151, 300, 9999];
    for d_failing in [false, true] {
        for f_failing in [false, true] {
            for &d_ms in &latencies {
                for &f_ms in &latencies {
                    let d = h(d_failing, d_ms);
                    let f = h(f_failing, f_ms);
                    let expected = if d_failing {
                        (!f_failing).then_some(ProcessorId::Fallback)
                    } else if d_ms <= 150 || f_failing || d_ms == f_ms {
                        Some(ProcessorId::Default)
                    } else if f_ms <= 150 {
                        Some(ProcessorId::Fallback)
                    } else {
                        Some(ProcessorId::Default)
                    };

                    let first = select_active(&d, &f);
                    assert_eq!(first, expected, "d=({d_failing},{d_ms}) f=({f_failing},{f_ms})");
                    assert_eq!(select_active(&d, &f), first);
                }
            }
        }
    }
}
