// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic end-to-end runs of the decision engine against synthetic
//! RTT regimes, checking the qualitative behavior the design promises:
//! noisy paths keep more throughput through a loss than congested paths,
//! and spurious reductions are fully unwound.

use crate::{
    controller::{testing::MockTransport, EnteCongestionController},
    event::NoopPublisher,
    Classification,
};
use core::time::Duration;

/// Jittering RTT cycle representative of a wireless path
const JITTER_REGIME: [u64; 16] = [
    20, 45, 18, 52, 23, 48, 19, 50, 33, 41, 27, 55, 21, 47, 25, 38,
];

/// Clustered RTT cycle representative of a saturated bottleneck queue
const QUEUEING_REGIME: [u64; 8] = [50, 51, 50, 52, 51, 50, 51, 90];

struct Simulation {
    cc: EnteCongestionController,
    transport: MockTransport,
    regime: &'static [u64],
    acks: usize,
}

impl Simulation {
    fn new(regime: &'static [u64], initial_window: u32) -> Self {
        let mut transport = MockTransport::new(initial_window);
        Self {
            cc: EnteCongestionController::new(&mut transport),
            transport,
            regime,
            acks: 0,
        }
    }

    /// Acknowledges `count` single segments, cycling through the regime's
    /// RTT pattern
    fn ack(&mut self, count: usize) {
        for _ in 0..count {
            let rtt = self.regime[self.acks % self.regime.len()];
            self.cc.on_ack(
                Duration::from_millis(rtt),
                1,
                &mut self.transport,
                &mut NoopPublisher,
            );
            self.acks += 1;
        }
    }

    /// Signals a loss and applies the host-side reduction to the returned
    /// threshold
    fn lose(&mut self) -> u32 {
        let ssthresh = self.cc.on_loss(&mut self.transport, &mut NoopPublisher);
        self.transport.congestion_window = ssthresh;
        ssthresh
    }

    fn window(&self) -> u32 {
        self.transport.congestion_window
    }
}

#[test]
fn regimes_classify_as_designed() {
    let mut jitter = Simulation::new(&JITTER_REGIME, 10);
    jitter.ack(50);
    assert_eq!(jitter.cc.classification(), Classification::Noise);

    let mut queueing = Simulation::new(&QUEUEING_REGIME, 10);
    queueing.ack(50);
    assert_eq!(queueing.cc.classification(), Classification::Congestion);
}

#[test]
fn jitter_regime_sustains_a_larger_window_through_loss() {
    let mut jitter = Simulation::new(&JITTER_REGIME, 10);
    let mut queueing = Simulation::new(&QUEUEING_REGIME, 10);

    // Identical schedules: 50 acks, one loss, 50 more acks
    jitter.ack(50);
    queueing.ack(50);
    assert_eq!(jitter.window(), queueing.window());

    let jitter_ssthresh = jitter.lose();
    let queueing_ssthresh = queueing.lose();
    assert!(jitter_ssthresh > queueing_ssthresh);

    jitter.ack(50);
    queueing.ack(50);
    assert!(jitter.window() > queueing.window());
}

#[test]
fn spurious_reduction_is_fully_unwound() {
    let mut simulation = Simulation::new(&JITTER_REGIME, 10);
    simulation.ack(40);

    let before_loss = simulation.window();
    simulation.lose();
    assert!(simulation.window() < before_loss);

    // The host later discovers the retransmission was unnecessary
    let restored = simulation
        .cc
        .undo(&mut simulation.transport, &mut NoopPublisher);

    assert_eq!(restored, before_loss);
    assert_eq!(simulation.window(), before_loss);
}

#[test]
fn evidence_survives_loss_but_not_idleness() {
    let mut simulation = Simulation::new(&JITTER_REGIME, 10);
    simulation.ack(16);
    assert_eq!(simulation.cc.classification(), Classification::Noise);

    // A loss keeps the verdict in place for the reduction decision
    simulation.lose();
    assert_eq!(simulation.cc.classification(), Classification::Noise);

    // Idleness does not: fresh evidence is required afterwards
    simulation.cc.on_idle_restart();
    assert_eq!(simulation.cc.classification(), Classification::Neutral);
    simulation.ack(8);
    assert_eq!(simulation.cc.classification(), Classification::Noise);
}
