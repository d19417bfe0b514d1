// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    controller::{testing::MockTransport, EnteCongestionController, MINIMUM_SSTHRESH},
    event::NoopPublisher,
    history::ENTROPY_WINDOW_SIZE,
};
use bolero::{check, generator::*};
use core::time::Duration;

#[derive(Debug, TypeGenerator)]
enum Operation {
    Ack {
        #[generator(1..=2000)]
        rtt_ms: u16,
        #[generator(0..=64)]
        acked: u32,
    },
    Loss,
    Undo,
    IdleRestart,
}

struct Model {
    /// The decision engine being fuzzed
    subject: EnteCongestionController,
    /// The host-owned window registers
    transport: MockTransport,
}

impl Model {
    fn new(initial_window: u32) -> Self {
        let mut transport = MockTransport::new(initial_window);
        Self {
            subject: EnteCongestionController::new(&mut transport),
            transport,
        }
    }

    fn apply(&mut self, operation: &Operation) {
        let mut publisher = NoopPublisher;
        match operation {
            Operation::Ack { rtt_ms, acked } => {
                let before = self.transport.congestion_window;
                self.subject.on_ack(
                    Duration::from_millis(*rtt_ms as u64),
                    *acked,
                    &mut self.transport,
                    &mut publisher,
                );
                assert!(self.transport.congestion_window >= before);
            }
            Operation::Loss => {
                let ssthresh = self.subject.on_loss(&mut self.transport, &mut publisher);
                assert!(ssthresh >= MINIMUM_SSTHRESH);
                // Model a host that reduces its window to the new threshold
                self.transport.congestion_window = ssthresh;
            }
            Operation::Undo => {
                let before = self.transport.congestion_window;
                let restored = self.subject.undo(&mut self.transport, &mut publisher);
                assert!(restored >= before);
                assert_eq!(restored, self.transport.congestion_window);
            }
            Operation::IdleRestart => {
                self.subject.on_idle_restart();
                assert_eq!(self.subject.diagnostics().history_sample_count, 0);
            }
        }
        self.invariants();
    }

    fn invariants(&self) {
        assert!(self.subject.entropy_score() <= 1000);
        assert!(self.transport.congestion_window >= 1);
        assert!(self.transport.slow_start_threshold >= MINIMUM_SSTHRESH);

        let diagnostics = self.subject.diagnostics();
        assert!(diagnostics.history_sample_count <= ENTROPY_WINDOW_SIZE);
        assert_eq!(diagnostics.entropy_score, self.subject.entropy_score());
    }
}

#[test]
fn ente_fuzz() {
    check!()
        .with_generator((1..=100u32, gen::<Vec<Operation>>()))
        .for_each(|(initial_window, operations)| {
            let mut model = Model::new(*initial_window);

            for operation in operations.iter() {
                model.apply(operation);
            }
        });
}
