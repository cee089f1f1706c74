#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::arbiter::{Disposition, ProtocolViolation};
    use crate::infrastructure_in_memory::BufferedGrantSink;
    use crate::journal::Journal;
    use crate::master::Master;
    use crate::types::{ExternalId, Message, ResourceId, SimConfig, SlotIndex, SlotState};

    fn test_master(resources: usize, instances: u32, slots: usize) -> Master {
        let config = SimConfig {
            resource_types: resources,
            instances_per_type: instances,
            max_slots: slots,
            max_total_workers: slots as u32,
            max_concurrent_workers: slots,
            verbose: false,
            ..SimConfig::default()
        };
        Master::new(config, Journal::disabled())
    }

    fn external(slot: SlotIndex) -> ExternalId {
        100 + slot as ExternalId
    }

    fn activate_all(master: &mut Master, count: usize) {
        for i in 0..count {
            assert_eq!(master.activate_worker(external(i)), Some(i));
        }
    }

    fn request(slot: SlotIndex, resource: ResourceId, quantity: u32) -> Message {
        Message::Request {
            slot,
            external_id: external(slot),
            resource,
            quantity,
        }
    }

    fn release(slot: SlotIndex, resource: ResourceId, quantity: u32) -> Message {
        Message::Release {
            slot,
            external_id: external(slot),
            resource,
            quantity,
        }
    }

    fn terminate(slot: SlotIndex) -> Message {
        Message::Terminate {
            slot,
            external_id: external(slot),
        }
    }

    fn assert_invariants(master: &Master) {
        assert!(master.ledger().is_conserved(master.table()));
        for (_, slot) in master.table().iter() {
            match slot.state {
                SlotState::Blocked => {
                    let nonzero = slot.request.iter().filter(|&&q| q > 0).count();
                    assert_eq!(nonzero, 1, "blocked slot must have one pending request");
                }
                _ => assert!(
                    slot.request.iter().all(|&q| q == 0),
                    "only blocked slots may carry a request"
                ),
            }
            for (r, &req) in slot.request.iter().enumerate() {
                assert!(slot.allocated[r] + req <= master.ledger().total(r));
            }
        }
    }

    #[test]
    fn test_immediate_grant_updates_ledger_and_emits() {
        let mut master = test_master(2, 2, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        let result = master.handle_message(&request(0, 0, 1), &mut sink);
        assert_eq!(result, Ok(Disposition::Granted));

        assert_eq!(master.ledger().available_all(), &[1, 2]);
        assert_eq!(master.table().slot(0).allocated, vec![1, 0]);
        assert_eq!(master.stats().grants_immediate, 1);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].slot, 0);
        assert_eq!(sink.sent[0].external_id, external(0));
        assert_eq!(sink.sent[0].quantity, 1);
        assert_invariants(&master);
    }

    #[test]
    fn test_block_then_unblock_on_release() {
        let mut master = test_master(2, 2, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        // Slot 0 drains R0 entirely.
        assert_eq!(
            master.handle_message(&request(0, 0, 2), &mut sink),
            Ok(Disposition::Granted)
        );
        sink.drain();

        // Slot 1 cannot be served and parks.
        assert_eq!(
            master.handle_message(&request(1, 0, 1), &mut sink),
            Ok(Disposition::Blocked)
        );
        assert_eq!(master.table().slot(1).state, SlotState::Blocked);
        assert_eq!(master.table().slot(1).block_order, Some(1));
        assert!(sink.sent.is_empty());

        // A single release wakes it.
        assert_eq!(
            master.handle_message(&release(0, 0, 1), &mut sink),
            Ok(Disposition::Released { unblocked: 1 })
        );
        assert_eq!(master.ledger().available(0), 0);
        assert_eq!(master.table().slot(1).allocated[0], 1);
        assert_eq!(master.table().slot(1).state, SlotState::Ready);
        assert_eq!(master.table().slot(1).block_order, None);
        assert_eq!(master.stats().grants_after_wait, 1);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].slot, 1);
        assert_invariants(&master);
    }

    #[test]
    fn test_fifo_regrant_serves_oldest_waiters_first() {
        let mut master = test_master(1, 3, 5);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 5);

        // Slot 0 takes everything; slots 2, 1, 3 then block in that order.
        assert_eq!(
            master.handle_message(&request(0, 0, 3), &mut sink),
            Ok(Disposition::Granted)
        );
        for &slot in &[2usize, 1, 3] {
            assert_eq!(
                master.handle_message(&request(slot, 0, 1), &mut sink),
                Ok(Disposition::Blocked)
            );
        }
        sink.drain();

        // Two instances come back: the two oldest waiters win, never
        // slot index order.
        assert_eq!(
            master.handle_message(&release(0, 0, 2), &mut sink),
            Ok(Disposition::Released { unblocked: 2 })
        );
        let granted: Vec<usize> = sink.sent.iter().map(|g| g.slot).collect();
        assert_eq!(granted, vec![2, 1]);
        assert_eq!(master.table().slot(3).state, SlotState::Blocked);
        assert_eq!(master.ledger().available(0), 0);
        assert_invariants(&master);
    }

    #[test]
    fn test_sweep_skips_oversized_waiter_for_smaller_one() {
        let mut master = test_master(1, 4, 3);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 3);

        assert_eq!(
            master.handle_message(&request(0, 0, 4), &mut sink),
            Ok(Disposition::Granted)
        );
        // Slot 1 wants more than the release below frees; slot 2 fits.
        assert_eq!(
            master.handle_message(&request(1, 0, 2), &mut sink),
            Ok(Disposition::Blocked)
        );
        assert_eq!(
            master.handle_message(&request(2, 0, 1), &mut sink),
            Ok(Disposition::Blocked)
        );
        sink.drain();

        assert_eq!(
            master.handle_message(&release(0, 0, 1), &mut sink),
            Ok(Disposition::Released { unblocked: 1 })
        );
        // No partial grant for slot 1: it keeps waiting for both.
        assert_eq!(master.table().slot(1).state, SlotState::Blocked);
        assert_eq!(master.table().slot(1).request[0], 2);
        assert_eq!(master.table().slot(2).state, SlotState::Ready);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].slot, 2);
        assert_invariants(&master);
    }

    #[test]
    fn test_terminate_releases_everything_and_sweeps() {
        let mut master = test_master(2, 2, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        assert_eq!(
            master.handle_message(&request(0, 0, 2), &mut sink),
            Ok(Disposition::Granted)
        );
        assert_eq!(
            master.handle_message(&request(0, 1, 1), &mut sink),
            Ok(Disposition::Granted)
        );
        assert_eq!(
            master.handle_message(&request(1, 0, 2), &mut sink),
            Ok(Disposition::Blocked)
        );
        sink.drain();

        assert_eq!(
            master.handle_message(&terminate(0), &mut sink),
            Ok(Disposition::Terminated)
        );
        assert_eq!(master.table().slot(0).state, SlotState::Unused);
        assert_eq!(master.table().slot(1).state, SlotState::Ready);
        assert_eq!(master.table().slot(1).allocated[0], 2);
        assert_eq!(master.ledger().available_all(), &[0, 2]);
        assert_eq!(master.stats().terminations_normal, 1);
        assert_eq!(master.stats().grants_after_wait, 1);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].slot, 1);
        assert_invariants(&master);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut master = test_master(2, 2, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        master.handle_message(&request(0, 1, 1), &mut sink).unwrap();
        assert_eq!(
            master.handle_message(&terminate(0), &mut sink),
            Ok(Disposition::Terminated)
        );

        let stats_after_first = *master.stats();
        let available_after_first = master.ledger().available_all().to_vec();

        // The terminate path may run twice for the same slot (message
        // plus reap); the second pass must change nothing.
        assert_eq!(
            master.handle_message(&terminate(0), &mut sink),
            Ok(Disposition::AlreadyUnused)
        );
        assert_eq!(*master.stats(), stats_after_first);
        assert_eq!(master.ledger().available_all(), &available_after_first[..]);
        assert_invariants(&master);
    }

    #[test]
    fn test_release_of_unheld_resource_is_ignored() {
        let mut master = test_master(2, 2, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        let result = master.handle_message(&release(0, 1, 1), &mut sink);
        assert_eq!(
            result,
            Err(ProtocolViolation::ReleaseUnheld {
                slot: 0,
                resource: 1,
                quantity: 1,
                held: 0,
            })
        );
        assert_eq!(master.ledger().available_all(), &[2, 2]);
        assert!(sink.sent.is_empty());
        assert_eq!(master.stats().grants_immediate, 0);
        assert_eq!(master.stats().grants_after_wait, 0);
        assert_invariants(&master);
    }

    #[test]
    fn test_request_while_blocked_is_a_violation() {
        let mut master = test_master(1, 1, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        master.handle_message(&request(0, 0, 1), &mut sink).unwrap();
        master.handle_message(&request(1, 0, 1), &mut sink).unwrap();
        assert_eq!(master.table().slot(1).state, SlotState::Blocked);

        // One outstanding request per worker, enforced by the arbiter.
        let result = master.handle_message(&request(1, 0, 1), &mut sink);
        assert_eq!(
            result,
            Err(ProtocolViolation::RequestWhileNotReady {
                slot: 1,
                state: SlotState::Blocked,
            })
        );
        assert_eq!(master.table().slot(1).request[0], 1);
        assert_invariants(&master);
    }

    #[test]
    fn test_request_beyond_per_type_total_is_a_violation() {
        let mut master = test_master(1, 3, 1);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 1);

        master.handle_message(&request(0, 0, 2), &mut sink).unwrap();
        let result = master.handle_message(&request(0, 0, 2), &mut sink);
        assert_eq!(
            result,
            Err(ProtocolViolation::RequestBeyondTotal {
                slot: 0,
                resource: 0,
                quantity: 2,
            })
        );
        assert_eq!(master.table().slot(0).allocated[0], 2);
        assert_invariants(&master);
    }

    #[test]
    fn test_zero_quantity_and_bad_addressing_are_violations() {
        let mut master = test_master(2, 2, 2);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 2);

        assert_eq!(
            master.handle_message(&request(0, 0, 0), &mut sink),
            Err(ProtocolViolation::ZeroQuantity { slot: 0 })
        );
        assert_eq!(
            master.handle_message(&request(9, 0, 1), &mut sink),
            Err(ProtocolViolation::SlotOutOfRange { slot: 9 })
        );
        assert_eq!(
            master.handle_message(&request(0, 7, 1), &mut sink),
            Err(ProtocolViolation::ResourceOutOfRange {
                slot: 0,
                resource: 7,
            })
        );
        assert_eq!(
            master.handle_message(
                &Message::Request {
                    slot: 0,
                    external_id: 9_999,
                    resource: 0,
                    quantity: 1,
                },
                &mut sink,
            ),
            Err(ProtocolViolation::IdentityMismatch {
                slot: 0,
                external_id: 9_999,
            })
        );

        assert_eq!(master.ledger().available_all(), &[2, 2]);
        assert!(sink.sent.is_empty());
        assert_invariants(&master);
    }

    #[test]
    fn test_conservation_holds_over_random_traces() {
        let mut master = test_master(3, 5, 6);
        let mut sink = BufferedGrantSink::new();
        activate_all(&mut master, 6);

        let mut rng = StdRng::seed_from_u64(0xD1CE);
        let mut next_external: ExternalId = 500;

        for _ in 0..5_000 {
            let slot = rng.random_range(0..6usize);
            let resource = rng.random_range(0..3usize);
            let quantity = rng.random_range(1..=2u32);

            let current_id = master
                .table()
                .slot(slot)
                .external_id
                .unwrap_or(external(slot));
            let msg = match rng.random_range(0..10u32) {
                0 => Message::Terminate {
                    slot,
                    external_id: current_id,
                },
                1..=3 => Message::Release {
                    slot,
                    external_id: current_id,
                    resource,
                    quantity,
                },
                _ => Message::Request {
                    slot,
                    external_id: current_id,
                    resource,
                    quantity,
                },
            };

            // Violations are part of the trace; the state must stay
            // lawful either way.
            let _ = master.handle_message(&msg, &mut sink);
            assert_invariants(&master);

            // Keep the population churning after terminations.
            if master.table().slot(slot).state == SlotState::Unused && rng.random_bool(0.8) {
                master.activate_worker(next_external);
                next_external += 1;
                assert_invariants(&master);
            }
        }

        // Every emitted grant carried a positive quantity.
        assert!(sink.sent.iter().all(|g| g.quantity >= 1));
    }
}
