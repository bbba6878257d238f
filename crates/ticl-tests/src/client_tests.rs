//! End-to-end session lifecycle scenarios.

use ticl::persistence::{deserialize_state, serialize_state, PersistentState, CLIENT_TOKEN_KEY};
use ticl::{ClientErrorType, ErrorReason, Scheduler, Sha1DigestFunction};
use ticl_proto::messages::DigestSerializationType;
use ticl_proto::{ErrorCode, Invalidation, ObjectId};

use crate::harness::{
    error_message, invalidation_message, token_control_message, ListenerEvent, TestClient,
    TEST_APPLICATION_ID, TEST_CLIENT_TYPE,
};

fn oid(name: &[u8]) -> ObjectId {
    ObjectId::new(4, name.to_vec())
}

mod fresh_start {
    use super::*;

    #[test]
    fn test_fresh_start_sends_initialize_and_acquires_token() {
        let t = TestClient::new(1000);
        t.client.start();
        t.scheduler.run_due();

        // The initialize message waits for the batching task.
        assert_eq!(t.network.sent_count(), 0);
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        assert_eq!(sent.len(), 1);
        let envelope = &sent[0];
        assert!(envelope.header.client_token.is_none());
        assert_eq!(envelope.header.message_id, 1);

        let initialize = envelope.initialize_message.as_ref().unwrap();
        assert_eq!(initialize.client_type, TEST_CLIENT_TYPE);
        assert_eq!(initialize.application_client_id, TEST_APPLICATION_ID);
        assert_eq!(initialize.nonce, b"1000");
        assert_eq!(
            initialize.digest_serialization_type,
            DigestSerializationType::ByteBased
        );

        // Server answers the nonce with a fresh token at t=1500.
        t.network
            .deliver(&token_control_message(b"1000", Some(b"T"), 1500));
        t.scheduler.run_due();

        assert_eq!(t.client.client_token(), Some(b"T".to_vec()));
        assert!(t.client.is_started());

        let events = t.listener.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ListenerEvent::Ready));
        match &events[1] {
            ListenerEvent::ReissueRegistrations { prefix, prefix_len } => {
                assert!(prefix.is_empty());
                assert_eq!(*prefix_len, 0);
            }
            other => panic!("expected reissue_registrations, got {other:?}"),
        }

        // The token was persisted under an authentication code.
        let blob = t.storage.get(CLIENT_TOKEN_KEY).expect("no state blob written");
        let state = deserialize_state(&blob, &mut Sha1DigestFunction::new()).unwrap();
        assert_eq!(state.client_token, b"T");
    }

    #[test]
    fn test_nonce_mismatch_is_dropped() {
        let t = TestClient::new(1000);
        t.client.start();
        t.scheduler.run_due();
        t.scheduler.advance_by(600);
        t.take_sent();

        t.network
            .deliver(&token_control_message(b"9999", Some(b"T"), 1500));
        t.scheduler.run_due();

        assert_eq!(t.client.client_token(), None);
        assert!(!t.client.is_started());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::NonceMismatch),
            1
        );
    }

    #[test]
    fn test_initialize_retried_with_backoff_on_timeout() {
        let t = TestClient::new(1000);
        t.client.start();
        t.scheduler.run_due();
        t.scheduler.advance_by(600);
        assert_eq!(t.take_sent().len(), 1);

        // No reply. The network timeout (60 s) fires, schedules a fresh
        // acquisition after the backoff delay (60 s), and a new
        // initialize with a new nonce goes out.
        t.scheduler.advance_by(130_000);
        let sent = t.take_sent();
        let initializes: Vec<_> = sent
            .iter()
            .filter_map(|m| m.initialize_message.as_ref())
            .collect();
        assert_eq!(initializes.len(), 1);
        assert_ne!(initializes[0].nonce, b"1000");
    }

    #[test]
    fn test_start_twice_is_ignored() {
        let t = TestClient::new(1000);
        t.client.start();
        t.client.start();
        t.scheduler.advance_by(600);
        let sent = t.take_sent();
        assert_eq!(
            sent.iter()
                .filter(|m| m.initialize_message.is_some())
                .count(),
            1
        );
    }

    #[test]
    fn test_read_failure_starts_fresh() {
        let t = TestClient::new(1000);
        t.storage.fail_reads(true);
        t.client.start();
        t.scheduler.run_due();
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        assert!(sent[0].initialize_message.is_some());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::PersistentReadFailure),
            1
        );
    }
}

mod restart {
    use super::*;

    #[test]
    fn test_restart_from_persisted_token_skips_initialize() {
        let t = TestClient::new(1000);
        let blob = serialize_state(
            &PersistentState {
                client_token: b"T".to_vec(),
            },
            &mut Sha1DigestFunction::new(),
        );
        t.storage.insert(CLIENT_TOKEN_KEY, blob);

        t.client.start();
        t.scheduler.run_due();

        assert_eq!(t.client.client_token(), Some(b"T".to_vec()));
        assert!(t.client.is_started());

        let events = t.listener.events();
        assert!(matches!(events[0], ListenerEvent::Ready));
        assert!(matches!(events[1], ListenerEvent::ReissueRegistrations { .. }));

        // The restart announcement is an info heartbeat, not an
        // initialize message.
        t.scheduler.advance_by(600);
        let sent = t.take_sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].initialize_message.is_none());
        assert!(sent[0].info_message.is_some());
        assert_eq!(sent[0].header.client_token, Some(b"T".to_vec()));
    }

    #[test]
    fn test_corrupt_blob_starts_fresh() {
        let t = TestClient::new(1000);
        t.storage.insert(CLIENT_TOKEN_KEY, b"corrupt".to_vec());

        t.client.start();
        t.scheduler.run_due();
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        assert!(sent[0].initialize_message.is_some());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::PersistentDeserializationFailure),
            1
        );
    }

    #[test]
    fn test_tampered_blob_starts_fresh() {
        let t = TestClient::new(1000);
        let mut blob = serialize_state(
            &PersistentState {
                client_token: b"T".to_vec(),
            },
            &mut Sha1DigestFunction::new(),
        );
        let index = blob.len() / 2;
        blob[index] ^= 0x40;
        t.storage.insert(CLIENT_TOKEN_KEY, blob);

        t.client.start();
        t.scheduler.run_due();
        t.scheduler.advance_by(600);
        assert!(t.take_sent()[0].initialize_message.is_some());
    }
}

mod token_destroy {
    use super::*;

    #[test]
    fn test_token_destroy_triggers_reacquisition_after_backoff() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");
        t.take_sent();

        t.network.deliver(&token_control_message(b"T", None, 5000));
        t.scheduler.run_due();
        assert_eq!(t.client.client_token(), None);

        // The new initialize goes out only after the backoff-smeared
        // delay (initial backoff = network timeout = 60 s) plus batching.
        let destroyed_at = t.scheduler.now_ms();
        t.scheduler.advance_by(130_000);
        let sent = t.take_sent();
        let initialize = sent
            .iter()
            .find(|m| m.initialize_message.is_some())
            .expect("no reacquisition initialize sent");
        assert!(initialize.header.client_token.is_none());
        let nonce = &initialize.initialize_message.as_ref().unwrap().nonce;
        let nonce_ms: i64 = String::from_utf8(nonce.clone()).unwrap().parse().unwrap();
        assert!(nonce_ms >= destroyed_at + 59_000, "nonce {nonce_ms} too early");
    }
}

mod auth_failure {
    use super::*;

    #[test]
    fn test_auth_failure_wipes_registrations_and_stops() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.client.register(oid(b"r1"));
        t.client.register(oid(b"r2"));
        t.scheduler.advance_by(600);
        t.take_sent();
        assert_eq!(t.client.registration_count(), 2);

        t.network
            .deliver(&error_message(b"T", ErrorCode::AuthFailure, "bad creds", 6000));
        t.scheduler.run_due();

        let events = t.listener.events();
        assert_eq!(events.len(), 3);
        for event in &events[0..2] {
            match event {
                ListenerEvent::RegistrationFailure {
                    is_transient,
                    description,
                    ..
                } => {
                    assert!(!is_transient);
                    assert_eq!(description, "Auth error: bad creds");
                }
                other => panic!("expected registration failure, got {other:?}"),
            }
        }
        match &events[2] {
            ListenerEvent::Error { error } => {
                assert_eq!(error.reason, ErrorReason::AuthFailure);
                assert!(!error.is_transient);
            }
            other => panic!("expected error event, got {other:?}"),
        }

        assert!(t.client.is_stopped());
        assert_eq!(t.client.registration_count(), 0);

        // A stopped client ignores further operations.
        t.client.register(oid(b"r3"));
        t.scheduler.run_due();
        assert_eq!(t.client.registration_count(), 0);
    }

    #[test]
    fn test_unknown_failure_is_informational() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.network.deliver(&error_message(
            b"T",
            ErrorCode::UnknownFailure,
            "hiccup",
            6000,
        ));
        t.scheduler.run_due();

        let events = t.listener.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ListenerEvent::Error { error } => {
                assert_eq!(error.reason, ErrorReason::UnknownFailure);
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(!t.client.is_stopped());
    }
}

mod invalidations {
    use super::*;

    #[test]
    fn test_invalidation_kinds_dispatch_to_matching_upcalls() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        let known = Invalidation::new(oid(b"known"), 42);
        let unknown = Invalidation::unknown_version(oid(b"unknown"));
        let all = Invalidation::unknown_version(ObjectId::all_objects());

        t.network.deliver(&invalidation_message(
            b"T",
            vec![known.clone(), unknown.clone(), all],
            5000,
        ));
        t.scheduler.run_due();

        let events = t.listener.events();
        assert_eq!(events.len(), 3);
        match &events[0] {
            ListenerEvent::Invalidate { invalidation, .. } => {
                assert_eq!(invalidation, &known);
            }
            other => panic!("expected invalidate, got {other:?}"),
        }
        match &events[1] {
            ListenerEvent::InvalidateUnknownVersion { object_id, .. } => {
                assert_eq!(object_id, &oid(b"unknown"));
            }
            other => panic!("expected invalidate_unknown_version, got {other:?}"),
        }
        assert!(matches!(events[2], ListenerEvent::InvalidateAll { .. }));
    }

    #[test]
    fn test_acknowledge_round_trips_through_ack_handle() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        let invalidation = Invalidation::new(oid(b"obj"), 7);
        t.network
            .deliver(&invalidation_message(b"T", vec![invalidation.clone()], 5000));
        t.scheduler.run_due();

        let ack_handle = match &t.listener.take_events()[0] {
            ListenerEvent::Invalidate { ack_handle, .. } => ack_handle.clone(),
            other => panic!("expected invalidate, got {other:?}"),
        };

        t.client.acknowledge(ack_handle);
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        let acks = sent
            .iter()
            .find_map(|m| m.invalidation_ack_message.as_ref())
            .expect("no ack message sent");
        assert_eq!(acks.invalidations, vec![invalidation]);
    }

    #[test]
    fn test_corrupt_ack_handle_is_counted_and_dropped() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.client
            .acknowledge(ticl::AckHandle::from_bytes(b"not a handle".to_vec()));
        t.scheduler.advance_by(600);

        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::AcknowledgeHandleFailure),
            1
        );
        assert!(t
            .take_sent()
            .iter()
            .all(|m| m.invalidation_ack_message.is_none()));
    }
}

mod persistence_retry {
    use super::*;

    #[test]
    fn test_failed_writes_retry_with_backoff_until_success() {
        let t = TestClient::new(1000);
        t.storage.fail_next_writes(2);
        t.start_with_token(b"T");
        assert!(t.storage.get(CLIENT_TOKEN_KEY).is_none());

        // First retry after ~10 s, second after ~20 s more.
        t.scheduler.advance_by(35_000);
        assert_eq!(t.storage.write_attempts(), 3);
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::PersistentWriteFailure),
            2
        );

        let blob = t.storage.get(CLIENT_TOKEN_KEY).expect("write never succeeded");
        let state = deserialize_state(&blob, &mut Sha1DigestFunction::new()).unwrap();
        assert_eq!(state.client_token, b"T");
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_register_before_ready_is_ignored() {
        let t = TestClient::new(1000);
        t.client.register(oid(b"early"));
        t.scheduler.run_due();
        assert_eq!(t.client.registration_count(), 0);
    }

    #[test]
    fn test_stop_halts_outbound_traffic() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");
        t.take_sent();

        t.client.stop();
        t.scheduler.run_due();
        assert!(t.client.is_stopped());

        t.client.register(oid(b"late"));
        t.scheduler.advance_by(2_000_000);
        assert_eq!(t.network.sent_count(), 0);
    }

    #[test]
    fn test_heartbeat_sends_periodic_info_messages() {
        let mut config = crate::harness::test_config();
        config.heartbeat_interval = std::time::Duration::from_secs(5);
        let t = TestClient::with_config(1000, config);
        t.start_with_token(b"T");
        t.take_sent();

        t.scheduler.advance_by(6_000);
        let first: Vec<_> = t.take_sent();
        assert_eq!(first.len(), 1);
        assert!(first[0].info_message.is_some());

        t.scheduler.advance_by(6_000);
        let second = t.take_sent();
        assert_eq!(second.len(), 1);
        assert!(second[0].info_message.is_some());
    }
}
