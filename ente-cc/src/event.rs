// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Telemetry events emitted by the decision engine.
//!
//! Hosts subscribe by implementing [`Publisher`] and passing it into the
//! controller operations. The engine publishes at most a couple of events
//! per operation and never allocates; [`NoopPublisher`] is the default for
//! hosts without a telemetry pipeline.

use crate::classifier::Classification;

/// Emitted each time the entropy score is re-evaluated
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct EntropyUpdated {
    /// Normalized entropy score in `[0, 1000]`
    pub entropy_score: u16,
    /// Verdict derived from the score
    pub classification: Classification,
    /// Number of RTT samples the evaluation covered
    pub sample_count: usize,
}

/// Emitted when the engine writes the congestion window or slow start
/// threshold registers
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct WindowUpdated {
    /// Congestion window after the update, in segments
    pub congestion_window: u32,
    /// Slow start threshold after the update, in segments
    pub slow_start_threshold: u32,
    /// Whether the connection is in slow start after the update
    pub in_slow_start: bool,
}

pub trait Publisher {
    fn on_entropy_updated(&mut self, event: EntropyUpdated);
    fn on_window_updated(&mut self, event: WindowUpdated);
}

/// Ignores all events
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn on_entropy_updated(&mut self, _event: EntropyUpdated) {}
    fn on_window_updated(&mut self, _event: WindowUpdated) {}
}

#[cfg(feature = "event-tracing")]
pub mod tracing {
    //! Forwards engine events to the `tracing` crate at debug level

    /// Emits each event as a `tracing` debug event
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Publisher;

    impl super::Publisher for Publisher {
        fn on_entropy_updated(&mut self, event: super::EntropyUpdated) {
            ::tracing::debug!(
                entropy_score = event.entropy_score,
                classification = ?event.classification,
                sample_count = event.sample_count,
                "entropy_updated"
            );
        }

        fn on_window_updated(&mut self, event: super::WindowUpdated) {
            ::tracing::debug!(
                congestion_window = event.congestion_window,
                slow_start_threshold = event.slow_start_threshold,
                in_slow_start = event.in_slow_start,
                "window_updated"
            );
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Publisher that records events for test assertions

    use super::*;

    #[derive(Clone, Debug, Default)]
    pub struct Publisher {
        pub entropy_updated: Vec<EntropyUpdated>,
        pub window_updated: Vec<WindowUpdated>,
    }

    impl super::Publisher for Publisher {
        fn on_entropy_updated(&mut self, event: EntropyUpdated) {
            self.entropy_updated.push(event);
        }

        fn on_window_updated(&mut self, event: WindowUpdated) {
            self.window_updated.push(event);
        }
    }
}
