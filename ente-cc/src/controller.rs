// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    classifier::Classification,
    entropy,
    event::{self, Publisher},
    history::RttHistory,
};
use core::{cmp::max, time::Duration};

/// Number of acknowledged segments between entropy re-evaluations.
///
/// Counted in segments, not ack invocations: a single ack covering eight
/// segments triggers an evaluation by itself.
pub const ENTROPY_EVAL_INTERVAL: u32 = 8;

//= https://www.rfc-editor.org/rfc/rfc5681#section-3.1
//# The initial value of ssthresh SHOULD be set arbitrarily high (e.g.,
//# to the size of the largest possible advertised window)
pub const INFINITE_SSTHRESH: u32 = 0x7fff_ffff;

/// Congestion-avoidance growth factor under a noise verdict, in per-mille
/// of the classic additive increase. Spurious RTT variation is no reason to
/// hold back, so lost throughput is probed back more aggressively.
const NOISE_GROWTH_FACTOR: u32 = 1500;

/// Congestion-avoidance growth factor under a congestion verdict, in
/// per-mille of the classic additive increase
const CONGESTION_GROWTH_FACTOR: u32 = 500;

const GROWTH_FACTOR_SCALE: u32 = 1000;

/// Smallest value the engine will write to the congestion window, in
/// segments
pub const MINIMUM_WINDOW: u32 = 1;

//= https://www.rfc-editor.org/rfc/rfc5681#section-3.1
//# ssthresh = max (FlightSize / 2, 2*SMSS)            (4)
pub const MINIMUM_SSTHRESH: u32 = 2;

/// Per-connection storage budget a host is assumed to allocate for a
/// congestion control state record, the `ICSK_CA_PRIV_SIZE` analogue of
/// kernel TCP stacks (13 × 8 bytes)
pub const MAX_STATE_SIZE: usize = 104;

/// Congestion window and slow start threshold registers owned by the host
/// transport, in whole segments.
///
/// The engine reads and writes both through this seam and never caches the
/// window, so the host remains free to clamp or reduce it between calls
/// while applying its own recovery policy. Values written by the engine
/// respect `congestion_window >= 1` and `slow_start_threshold >= 2`.
pub trait Transport {
    fn congestion_window(&self) -> u32;
    fn set_congestion_window(&mut self, segments: u32);
    fn slow_start_threshold(&self) -> u32;
    fn set_slow_start_threshold(&mut self, segments: u32);
}

/// Read-only snapshot exposed to the host's diagnostics surface.
///
/// The export wire format is a host concern; the engine only defines the
/// record.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Diagnostics {
    /// Number of RTT samples currently held for entropy analysis
    pub history_sample_count: usize,
    /// Average of the held RTT samples
    pub average_rtt: Duration,
    /// Latest normalized entropy score
    pub entropy_score: u16,
}

/// Per-connection entropy-enhanced congestion control engine.
///
/// One instance is owned exclusively by its connection and driven serially
/// by that connection's event processing context; the engine performs no
/// internal synchronization, no allocation, and no I/O, and every operation
/// is bounded by the fixed sample window size.
///
/// There is no explicit recovery state: slow start and congestion avoidance
/// are distinguished purely by the numeric relation between the window and
/// the slow start threshold, so lowering the threshold on loss implicitly
/// re-enters congestion avoidance.
#[derive(Clone, Debug)]
pub struct EnteCongestionController {
    rtt_history: RttHistory,
    /// Smallest RTT observed over the connection lifetime
    min_rtt: Option<Duration>,
    /// Window captured by the last loss response, restored by [`Self::undo`]
    prior_cwnd: u32,
    /// Segments acknowledged since the last entropy evaluation
    acked_since_eval: u32,
    entropy_score: u16,
    classification: Classification,
    /// Whether an evaluation with enough samples has happened yet; until it
    /// has, `classification` is not meaningful and policy falls back to
    /// classic behavior
    has_entropy_data: bool,
    /// Derived every ack from `congestion_window < slow_start_threshold`
    in_slow_start: bool,
    /// Set by a loss signal, cleared by the next entropy evaluation
    loss_pending: bool,
    /// Additive-increase credit carried between acks; the window grows by
    /// one segment each time the accumulated credit reaches the window
    increase_credit: u32,
}

const _: () = assert!(core::mem::size_of::<EnteCongestionController>() <= MAX_STATE_SIZE);

impl EnteCongestionController {
    /// Creates the engine for a newly established connection.
    ///
    /// Captures the transport's initial window for [`Self::undo`] and
    /// raises the slow start threshold to its effectively infinite starting
    /// value, so the connection begins in slow start.
    pub fn new<T: Transport>(transport: &mut T) -> Self {
        transport.set_slow_start_threshold(INFINITE_SSTHRESH);
        Self {
            rtt_history: RttHistory::new(),
            min_rtt: None,
            prior_cwnd: transport.congestion_window(),
            acked_since_eval: 0,
            entropy_score: 0,
            classification: Classification::Neutral,
            has_entropy_data: false,
            in_slow_start: true,
            loss_pending: false,
            increase_credit: 0,
        }
    }

    /// Processes an acknowledgment of `acked` newly acknowledged segments.
    ///
    /// `smoothed_rtt` is the host's current smoothed RTT estimate; it is
    /// recorded in whole milliseconds with a 1ms floor. A call with
    /// `acked == 0` is a no-op.
    #[inline]
    pub fn on_ack<T: Transport, Pub: Publisher>(
        &mut self,
        smoothed_rtt: Duration,
        acked: u32,
        transport: &mut T,
        publisher: &mut Pub,
    ) {
        if acked == 0 {
            return;
        }

        self.acked_since_eval = self.acked_since_eval.saturating_add(acked);

        self.rtt_history.record(smoothed_rtt);
        if self.min_rtt.map_or(true, |min_rtt| smoothed_rtt < min_rtt) {
            self.min_rtt = Some(smoothed_rtt);
        }

        self.maybe_evaluate_entropy(publisher);

        self.in_slow_start = transport.congestion_window() < transport.slow_start_threshold();

        let before = transport.congestion_window();
        if self.in_slow_start {
            //= https://www.rfc-editor.org/rfc/rfc5681#section-3.1
            //# During slow start, a TCP increments cwnd by at most SMSS bytes for
            //# each ACK received that cumulatively acknowledges new data.
            let credit = match self.verdict() {
                // Confirmed congestion: take half the usual slow start
                // credit to avoid overshooting the queue
                Classification::Congestion => max(acked / 2, 1),
                Classification::Noise | Classification::Neutral => acked,
            };
            self.slow_start(credit, transport);
        } else {
            //= https://www.rfc-editor.org/rfc/rfc5681#section-3.1
            //# During congestion avoidance, cwnd is incremented by roughly 1 full-
            //# sized segment per round-trip time (RTT).
            let window = max(before, MINIMUM_WINDOW);
            let credit = match self.verdict() {
                Classification::Noise => scaled_credit(acked, NOISE_GROWTH_FACTOR, window),
                Classification::Congestion => {
                    scaled_credit(acked, CONGESTION_GROWTH_FACTOR, window)
                }
                // Inconclusive evidence: classic Reno credit
                Classification::Neutral => acked,
            };
            self.congestion_avoidance(credit, transport);
        }

        let after = transport.congestion_window();
        debug_assert!(after >= before, "window growth must never reduce the window");
        if after != before {
            publisher.on_window_updated(event::WindowUpdated {
                congestion_window: after,
                slow_start_threshold: transport.slow_start_threshold(),
                in_slow_start: self.in_slow_start,
            });
        }
    }

    /// Computes the loss response and writes the new slow start threshold.
    ///
    /// The verdict consulted here may predate the loss by up to an
    /// evaluation interval; responding immediately on stale evidence is
    /// preferred over blocking on a fresh entropy sample, and a loss
    /// arriving before the first evaluation takes the classic halving. The
    /// window itself is reduced by the host transport's own recovery
    /// machinery; the pre-loss window is recorded for [`Self::undo`].
    pub fn on_loss<T: Transport, Pub: Publisher>(
        &mut self,
        transport: &mut T,
        publisher: &mut Pub,
    ) -> u32 {
        self.loss_pending = true;

        let window = transport.congestion_window();
        let ssthresh = match self.verdict() {
            // A loss under high entropy is presumed spurious (a wireless
            // blip rather than queue overflow), so back off to two thirds
            // instead of half
            Classification::Noise => max(window * 2 / 3, MINIMUM_SSTHRESH),
            Classification::Congestion | Classification::Neutral => {
                max(window / 2, MINIMUM_SSTHRESH)
            }
        };

        self.prior_cwnd = window;
        transport.set_slow_start_threshold(ssthresh);
        self.in_slow_start = transport.congestion_window() < ssthresh;

        publisher.on_window_updated(event::WindowUpdated {
            congestion_window: transport.congestion_window(),
            slow_start_threshold: ssthresh,
            in_slow_start: self.in_slow_start,
        });

        ssthresh
    }

    /// Restores the window recorded before the last loss response.
    ///
    /// Invoked by the host once it determines the loss was spurious (for
    /// example, a retransmission acknowledged as unnecessary). This is the
    /// self-correction path for the cases the entropy verdict got wrong:
    /// an overly conservative reduction is unwound regardless of what the
    /// classifier believed at loss time. Returns the restored window.
    pub fn undo<T: Transport, Pub: Publisher>(
        &mut self,
        transport: &mut T,
        publisher: &mut Pub,
    ) -> u32 {
        let window = max(transport.congestion_window(), self.prior_cwnd);
        transport.set_congestion_window(window);
        self.in_slow_start = window < transport.slow_start_threshold();

        publisher.on_window_updated(event::WindowUpdated {
            congestion_window: window,
            slow_start_threshold: transport.slow_start_threshold(),
            in_slow_start: self.in_slow_start,
        });

        window
    }

    /// Partial reset after an idle period.
    ///
    /// Distributional evidence goes stale while the connection is idle, so
    /// the sample window and verdict are discarded. The congestion window,
    /// slow start threshold, and minimum RTT survive; restarting the window
    /// after idleness is the host transport's policy, not the engine's.
    pub fn on_idle_restart(&mut self) {
        self.rtt_history.clear();
        self.has_entropy_data = false;
    }

    /// Telemetry snapshot for the host's diagnostics surface
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            history_sample_count: self.rtt_history.len(),
            average_rtt: self.rtt_history.average(),
            entropy_score: self.entropy_score,
        }
    }

    /// Latest normalized entropy score in `[0, 1000]`
    pub fn entropy_score(&self) -> u16 {
        self.entropy_score
    }

    /// Verdict from the latest evaluation; Neutral until enough samples
    /// have been observed
    pub fn classification(&self) -> Classification {
        self.verdict()
    }

    /// Smallest RTT observed, once a sample has been recorded
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    /// Whether the last operation left the connection in slow start
    pub fn is_in_slow_start(&self) -> bool {
        self.in_slow_start
    }

    /// Whether a loss signal has arrived since the last entropy evaluation
    pub fn loss_pending(&self) -> bool {
        self.loss_pending
    }

    /// Variance of the held RTT samples in ms², for host quick checks
    pub fn rtt_variance(&self) -> u32 {
        self.rtt_history.variance()
    }

    /// Last computed verdict, or Neutral while no evaluation has had enough
    /// samples
    fn verdict(&self) -> Classification {
        if self.has_entropy_data {
            self.classification
        } else {
            Classification::Neutral
        }
    }

    /// Re-evaluates entropy and classification once enough segments have
    /// been acknowledged since the last evaluation.
    ///
    /// Evaluation is deferred (with the segment counter left running) until
    /// the history holds enough samples, which also covers the stretch
    /// right after an idle restart.
    fn maybe_evaluate_entropy<Pub: Publisher>(&mut self, publisher: &mut Pub) {
        if self.acked_since_eval < ENTROPY_EVAL_INTERVAL
            || self.rtt_history.len() < entropy::MIN_ENTROPY_SAMPLES
        {
            return;
        }

        self.entropy_score = entropy::estimate(self.rtt_history.samples());
        self.classification = Classification::from_entropy_score(self.entropy_score);
        self.has_entropy_data = true;
        self.acked_since_eval = 0;
        // The next loss response should reflect post-loss conditions
        self.loss_pending = false;

        publisher.on_entropy_updated(event::EntropyUpdated {
            entropy_score: self.entropy_score,
            classification: self.classification,
            sample_count: self.rtt_history.len(),
        });
    }

    /// Exponential growth, capped at the slow start threshold so the
    /// transition into congestion avoidance lands exactly on it
    fn slow_start<T: Transport>(&mut self, credit: u32, transport: &mut T) {
        let window = transport.congestion_window();
        let window = window
            .saturating_add(credit)
            .min(transport.slow_start_threshold());
        transport.set_congestion_window(window);
    }

    /// Classic additive-increase credit scheme: per-ack credit accumulates
    /// and the window grows by a full segment each time the accumulated
    /// credit reaches the current window
    fn congestion_avoidance<T: Transport>(&mut self, credit: u32, transport: &mut T) {
        let mut window = max(transport.congestion_window(), MINIMUM_WINDOW);

        // Credit accumulated against a larger window is applied gently
        // before new credit is added
        if self.increase_credit >= window {
            self.increase_credit = 0;
            window = window.saturating_add(1);
        }

        self.increase_credit = self.increase_credit.saturating_add(credit);
        if self.increase_credit >= window {
            let delta = self.increase_credit / window;
            self.increase_credit -= delta * window;
            window = window.saturating_add(delta);
        }

        transport.set_congestion_window(window);
    }
}

/// Per-ack congestion avoidance credit scaled by a per-mille factor,
/// floored at one unit so every acknowledgment makes forward progress
#[inline]
fn scaled_credit(acked: u32, factor: u32, window: u32) -> u32 {
    let credit = acked as u64 * factor as u64 / (window as u64 * GROWTH_FACTOR_SCALE as u64);
    max(credit as u32, 1)
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::Transport;

    /// In-memory window registers for tests and simulations
    #[derive(Clone, Copy, Debug)]
    pub struct MockTransport {
        pub congestion_window: u32,
        pub slow_start_threshold: u32,
    }

    impl MockTransport {
        pub fn new(congestion_window: u32) -> Self {
            Self {
                congestion_window,
                slow_start_threshold: super::INFINITE_SSTHRESH,
            }
        }
    }

    impl Transport for MockTransport {
        fn congestion_window(&self) -> u32 {
            self.congestion_window
        }

        fn set_congestion_window(&mut self, segments: u32) {
            self.congestion_window = segments;
        }

        fn slow_start_threshold(&self) -> u32 {
            self.slow_start_threshold
        }

        fn set_slow_start_threshold(&mut self, segments: u32) {
            self.slow_start_threshold = segments;
        }
    }
}
