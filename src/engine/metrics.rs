use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::models::Verdict;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    accepted_total: AtomicU64,
    wrong_answer_total: AtomicU64,
    runtime_error_total: AtomicU64,
    time_limit_exceeded_total: AtomicU64,
    compilation_error_total: AtomicU64,
    rejected_total: AtomicU64,
    internal_error_total: AtomicU64,
    in_flight: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one judging call as in flight until the guard is dropped,
    /// including when the handler future is cancelled mid-call.
    pub fn track_in_flight(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight(self)
    }

    pub fn judged(&self, verdict: Verdict) {
        self.verdict_counter(verdict).fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn internal_error(&self) {
        self.internal_error_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        let mut out = String::from("# TYPE judge_verdicts_total counter\n");
        for verdict in Verdict::all() {
            out.push_str(&format!(
                "judge_verdicts_total{{verdict=\"{}\"}} {}\n",
                verdict.label(),
                self.verdict_counter(*verdict).load(Ordering::Relaxed)
            ));
        }
        out.push_str(&format!(
            concat!(
                "# TYPE judge_rejected_total counter\n",
                "judge_rejected_total {}\n",
                "# TYPE judge_internal_errors_total counter\n",
                "judge_internal_errors_total {}\n",
                "# TYPE judge_in_flight gauge\n",
                "judge_in_flight {}\n"
            ),
            self.rejected_total.load(Ordering::Relaxed),
            self.internal_error_total.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        ));
        out
    }

    fn verdict_counter(&self, verdict: Verdict) -> &AtomicU64 {
        match verdict {
            Verdict::Accepted => &self.accepted_total,
            Verdict::WrongAnswer => &self.wrong_answer_total,
            Verdict::RuntimeError => &self.runtime_error_total,
            Verdict::TimeLimitExceeded => &self.time_limit_exceeded_total,
            Verdict::CompilationError => &self.compilation_error_total,
        }
    }

    fn decrement_in_flight(&self) {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct InFlight<'a>(&'a MetricsRegistry);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.decrement_in_flight();
    }
}
