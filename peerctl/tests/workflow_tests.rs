//! End-to-end tests for the peering workflows over stubbed bridges

mod common;

use std::sync::Arc;

use peerctl::error::Error;
use peerctl::models::{Network, PeerRequest, PeerSession, SessionStatus};
use peerctl::workflow::{EmailWorkflow, SessionWorkflow, WorkflowStep};
use peerctl_common::config::EmailConfig;
use peerctl_common::db;

use common::{contact, member, remote_network, resolver, RecordingTransport};

fn email_config(test_mode: bool) -> EmailConfig {
    EmailConfig {
        default_from: "noreply@ours.example.com".to_string(),
        subject_prefix: String::new(),
        test_mode,
    }
}

/// AS63311 and AS20 share exchanges 239 and 240; AS63311 is alone at 300
fn standard_resolver() -> Arc<peerctl::refs::Resolver> {
    resolver(
        vec![
            member(1, 63311, 239, "206.41.110.18", "2001:504:41::18"),
            member(2, 63311, 240, "198.32.118.18", ""),
            member(3, 63311, 300, "203.0.113.18", ""),
            member(4, 20, 239, "206.41.110.48", "2001:504:41::48"),
            member(5, 20, 240, "198.32.118.48", ""),
        ],
        vec![remote_network(63311, "Ours"), remote_network(20, "Peer20")],
        vec![
            contact(63311, "noc@ours.example.com"),
            contact(20, "peering@peer20.example.net"),
        ],
        vec![],
    )
}

#[tokio::test]
async fn request_fans_out_across_mutual_exchanges() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    let (request, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    // one session per mutual exchange, none for exchange 300
    assert_eq!(sessions.len(), 2);
    for session in &sessions {
        assert_eq!(session.session_status().unwrap(), SessionStatus::Requested);
    }

    let locations = request.locations(&pool).await.unwrap();
    assert_eq!(locations.len(), 2);
}

#[tokio::test]
async fn request_without_mutual_exchange_fails() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = resolver(
        vec![
            member(1, 63311, 239, "206.41.110.18", ""),
            member(2, 30, 500, "192.0.2.30", ""),
        ],
        vec![remote_network(63311, "Ours"), remote_network(30, "Peer30")],
        vec![contact(30, "peering@peer30.example.net")],
        vec![],
    );
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    let err = workflow
        .request(&net, 30, "tester", "email", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // nothing was written
    assert!(PeerRequest::for_net(&pool, net.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn request_honors_exclusions() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    let (request, sessions) = workflow
        .request(&net, 20, "tester", "email", &["pdbctl:239".to_string()])
        .await
        .unwrap();

    // only exchange 240 is left
    assert_eq!(sessions.len(), 1);
    assert_eq!(request.locations(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn request_bootstraps_inventory_ports() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver.clone(), 100);
    let (_, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    // each session rides a freshly allocated placeholder port, with the
    // device derived from it
    for session in &sessions {
        assert!(session.port > 0);
        assert_eq!(session.device, Some(900));

        let port = resolver.port(session.port).await.unwrap();
        assert!(port.virtual_port_name.starts_with("peerctl:"));
    }
}

#[tokio::test]
async fn sessions_bind_the_peer_endpoint() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver.clone(), 100);
    let (_, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    let mut peer_ips = Vec::new();
    let mut our_ips = Vec::new();
    for session in &sessions {
        let peer_port = peerctl::models::PeerPort::by_id(&pool, session.peer_port_id)
            .await
            .unwrap();
        let info = peer_port.port_info(&pool).await.unwrap();
        peer_ips.push(
            info.ipaddr(&resolver, peerctl::models::IpVersion::V4)
                .await
                .unwrap()
                .unwrap(),
        );
        our_ips.push(resolver.port(session.port).await.unwrap().ip_address_4.unwrap());
    }
    peer_ips.sort();
    our_ips.sort();

    // the peer-port side carries AS20's addresses, ours travel on the
    // session's own port
    assert_eq!(peer_ips, vec!["198.32.118.48", "206.41.110.48"]);
    assert_eq!(our_ips, vec!["198.32.118.18", "206.41.110.18"]);
}

#[tokio::test]
async fn progress_walks_the_full_lifecycle() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);

    let outcome = workflow.progress(&net, 20, "tester", &[]).await.unwrap();
    assert_eq!(outcome.step, WorkflowStep::Request);

    let outcome = workflow.progress(&net, 20, "tester", &[]).await.unwrap();
    assert_eq!(outcome.step, WorkflowStep::ConfigComplete);

    let outcome = workflow.progress(&net, 20, "tester", &[]).await.unwrap();
    assert_eq!(outcome.step, WorkflowStep::Finalize);
    for session in &outcome.sessions {
        assert_eq!(session.session_status().unwrap(), SessionStatus::Ok);
    }

    // the open request was completed on finalize
    let requests = PeerRequest::for_net(&pool, net.id).await.unwrap();
    assert_eq!(requests[0].status, "completed");

    // fully established pairs are a no-op
    let outcome = workflow.progress(&net, 20, "tester", &[]).await.unwrap();
    assert_eq!(outcome.step, WorkflowStep::Done);
    for session in &outcome.sessions {
        assert_eq!(session.session_status().unwrap(), SessionStatus::Ok);
    }
}

#[tokio::test]
async fn sessions_never_regress() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    let (_, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    let mut session = PeerSession::by_id(&pool, sessions[0].id).await.unwrap();
    let moved = session
        .set_status(&pool, SessionStatus::Pending)
        .await
        .unwrap();
    assert!(!moved);
    assert_eq!(session.session_status().unwrap(), SessionStatus::Requested);
}

#[tokio::test]
async fn deleted_sessions_can_be_restarted() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    let (_, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    for session in &sessions {
        let mut session = PeerSession::by_id(&pool, session.id).await.unwrap();
        session.set_status(&pool, SessionStatus::Deleted).await.unwrap();
    }

    // deleted rows read as absent: the pair starts over
    assert_eq!(
        workflow.next_step(&net, 20).await.unwrap(),
        WorkflowStep::Request
    );

    let (_, restarted) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();
    assert_eq!(restarted.len(), 2);
    for session in &restarted {
        assert_eq!(session.session_status().unwrap(), SessionStatus::Requested);
    }

    // the same rows were reused, not duplicated
    assert_eq!(PeerSession::for_peer(&pool, net.id, 20).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_sessions_parse_and_restart() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    let (_, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    let mut session = PeerSession::by_id(&pool, sessions[0].id).await.unwrap();
    session.set_status(&pool, SessionStatus::Failed).await.unwrap();

    let reloaded = PeerSession::by_id(&pool, session.id).await.unwrap();
    assert_eq!(reloaded.session_status().unwrap(), SessionStatus::Failed);

    // one live session at requested keeps the pair on config-complete;
    // delete it and the failed row alone reads as a fresh pair
    let mut other = PeerSession::by_id(&pool, sessions[1].id).await.unwrap();
    other.set_status(&pool, SessionStatus::Deleted).await.unwrap();
    assert_eq!(
        workflow.next_step(&net, 20).await.unwrap(),
        WorkflowStep::Request
    );
}

#[tokio::test]
async fn request_is_idempotent_per_session() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver, 100);
    workflow.request(&net, 20, "tester", "email", &[]).await.unwrap();
    workflow.request(&net, 20, "tester", "email", &[]).await.unwrap();

    // the second request reuses the same (port, peer port) rows
    let sessions = PeerSession::for_peer(&pool, net.id, 20).await.unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn quota_is_checked_before_any_write() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = resolver(
        vec![
            member(1, 63311, 239, "206.41.110.18", ""),
            member(2, 63311, 240, "198.32.118.18", ""),
            member(3, 20, 239, "206.41.110.48", ""),
            member(4, 20, 240, "198.32.118.48", ""),
            member(5, 21, 239, "206.41.110.49", ""),
        ],
        vec![
            remote_network(63311, "Ours"),
            remote_network(20, "Peer20"),
            remote_network(21, "Peer21"),
        ],
        vec![
            contact(20, "peering@peer20.example.net"),
            contact(21, "peering@peer21.example.net"),
        ],
        vec![],
    );
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver.clone(), 100);
    workflow.request(&net, 20, "tester", "email", &[]).await.unwrap();

    // two sessions exist; a limit of 2 leaves no room toward AS21
    let limited = SessionWorkflow::new(pool.clone(), resolver, 2);
    let err = limited
        .request(&net, 21, "tester", "email", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UsageLimit(_)));

    // nothing toward AS21 was written
    assert!(PeerSession::for_peer(&pool, net.id, 21).await.unwrap().is_empty());
}

#[tokio::test]
async fn progress_rechecks_quota_on_every_step() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(pool.clone(), resolver.clone(), 100);
    workflow.request(&net, 20, "tester", "email", &[]).await.unwrap();

    // the pair sits at two sessions; with the quota filled, even a
    // follow-up step is refused until room is made
    let limited = SessionWorkflow::new(pool.clone(), resolver, 2);
    let err = limited.progress(&net, 20, "tester", &[]).await.unwrap_err();
    assert!(matches!(err, Error::UsageLimit(_)));
}

#[tokio::test]
async fn email_workflow_notifies_peer_contact() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let transport = Arc::new(RecordingTransport::default());
    let workflow = EmailWorkflow::new(
        SessionWorkflow::new(pool.clone(), resolver, 100),
        transport.clone(),
        email_config(false),
    );

    workflow.progress(&net, 20, "tester", &[]).await.unwrap();

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to[0].0, "peering@peer20.example.net");
    assert!(sent[0].subject.contains("Peering request from Ours (AS63311)"));
    assert!(sent[0].body.contains("AS63311"));
}

#[tokio::test]
async fn missing_contact_blocks_the_step() {
    let pool = db::init_memory_pool().await.unwrap();
    // AS20 has no policy contact on record
    let resolver = resolver(
        vec![
            member(1, 63311, 239, "206.41.110.18", ""),
            member(2, 20, 239, "206.41.110.48", ""),
        ],
        vec![remote_network(63311, "Ours"), remote_network(20, "Peer20")],
        vec![],
        vec![],
    );
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let transport = Arc::new(RecordingTransport::default());
    let workflow = EmailWorkflow::new(
        SessionWorkflow::new(pool.clone(), resolver, 100),
        transport.clone(),
        email_config(false),
    );

    let err = workflow.progress(&net, 20, "tester", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // the pair did not advance behind the peer's back
    assert!(transport.sent.lock().unwrap().is_empty());
    assert!(PeerSession::for_peer(&pool, net.id, 20).await.unwrap().is_empty());
    assert!(PeerRequest::for_net(&pool, net.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn email_test_mode_redirects_to_own_contact() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let transport = Arc::new(RecordingTransport::default());
    let workflow = EmailWorkflow::new(
        SessionWorkflow::new(pool.clone(), resolver, 100),
        transport.clone(),
        email_config(true),
    );

    workflow.progress(&net, 20, "tester", &[]).await.unwrap();

    let sent = transport.sent.lock().unwrap();
    // redirected to our own peering contact, never the peer
    assert_eq!(sent[0].to[0].0, "noc@ours.example.com");
    assert!(sent[0].subject.starts_with("[TEST]"));
}

#[tokio::test]
async fn email_log_records_every_send() {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let transport = Arc::new(RecordingTransport::default());
    let workflow = EmailWorkflow::new(
        SessionWorkflow::new(pool.clone(), resolver, 100),
        transport,
        email_config(false),
    );

    workflow.progress(&net, 20, "tester", &[]).await.unwrap();
    workflow.progress(&net, 20, "tester", &[]).await.unwrap();

    let logs = peerctl::models::EmailLog::for_net(&pool, net.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    let recipients = logs[0].recipients(&pool).await.unwrap();
    assert_eq!(recipients[0].email, "peering@peer20.example.net");
    assert_eq!(recipients[0].asn, Some(20));
}
