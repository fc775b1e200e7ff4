//! Resolver scenarios driven through scripted fake sessions: metadata-server
//! connection failover, topology parsing, and the live-status probe walk.

mod support;

use support::*;

use shunt_common::RouterError;
use shunt_metadata::types::{ReplicaSetStatus, ServerMode};

#[tokio::test]
async fn test_connects_to_first_metadata_server() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);

    factory.session(0).allow_connections(&["localhost:3310"]);
    assert!(metadata.connect(&metadata_servers()).await);

    assert_eq!(factory.events(), vec!["connect-ok localhost:3310"]);
    assert_eq!(factory.create_count(), 1);
}

#[tokio::test]
async fn test_connects_to_third_metadata_server() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);

    factory.session(0).allow_connections(&["localhost:3330"]);
    assert!(metadata.connect(&metadata_servers()).await);

    // one session total, two refused attempts before the accepted one
    assert_eq!(
        factory.events(),
        vec![
            "connect-fail localhost:3310",
            "connect-fail localhost:3320",
            "connect-ok localhost:3330",
        ]
    );
    assert_eq!(factory.create_count(), 1);
}

#[tokio::test]
async fn test_connect_fails_when_all_servers_refuse() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);

    assert!(!metadata.connect(&metadata_servers()).await);

    assert_eq!(
        factory.events(),
        vec![
            "connect-fail localhost:3310",
            "connect-fail localhost:3320",
            "connect-fail localhost:3330",
        ]
    );
    assert_eq!(factory.create_count(), 1);
}

#[tokio::test]
async fn test_fetch_instances_parses_typical_topology() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_metadata(Ok(vec![
        row(&["replicaset-1", "instance-1", "HA", "0.2", "0", "location1", "localhost:3310", "localhost:33100"]),
        row_opt(&[
            Some("replicaset-1"), Some("instance-2"), Some("arbitrary_string"), Some("1.5"),
            Some("1"), Some("s.o_loc"), Some("localhost:3320"), None,
        ]),
        row_opt(&[
            Some("replicaset-1"), Some("instance-3"), Some(""), Some("0.0"), Some("99"),
            Some(""), Some("localhost"), None,
        ]),
        row_opt(&[
            Some("replicaset-1"), Some("instance-4"), Some(""), None, None, Some(""), None, None,
        ]),
    ]));

    let sets = metadata
        .fetch_instances_from_metadata_server("replicaset-1")
        .await
        .unwrap();

    assert_eq!(sets.len(), 1);
    let members = &sets["replicaset-1"];
    assert_eq!(members.len(), 4);

    assert_eq!(members[0].server_uuid, "instance-1");
    assert_eq!(members[0].role_text, "HA");
    assert!((members[0].weight - 0.2).abs() < 0.001);
    assert_eq!(members[0].location, "location1");
    assert_eq!((members[0].host.as_str(), members[0].port, members[0].xport), ("localhost", 3310, 33100));

    // explicit x-address absent: xport falls back to port * 10
    assert!((members[1].weight - 1.5).abs() < 0.001);
    assert_eq!(members[1].version_token, 1);
    assert_eq!((members[1].host.as_str(), members[1].port, members[1].xport), ("localhost", 3320, 33200));

    // address without a port defaults to 3306/33060
    assert_eq!(members[2].version_token, 99);
    assert_eq!((members[2].host.as_str(), members[2].port, members[2].xport), ("localhost", 3306, 33060));

    // NULL address: empty host kept with default ports, NULL numerics read 0
    assert_eq!(members[3].weight, 0.0);
    assert_eq!(members[3].version_token, 0);
    assert_eq!((members[3].host.as_str(), members[3].port, members[3].xport), ("", 3306, 33060));

    // every parsed instance starts out unavailable
    assert!(members.iter().all(|m| m.mode == ServerMode::Unavailable));
}

#[tokio::test]
async fn test_fetch_instances_groups_multiple_replicasets() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_metadata(Ok(vec![
        row_opt(&[Some("replicaset-2"), Some("instance-4"), Some("HA"), None, None, Some(""), Some("localhost2:3333"), None]),
        row_opt(&[Some("replicaset-1"), Some("instance-1"), Some("HA"), None, None, Some(""), Some("localhost1:1111"), None]),
        row_opt(&[Some("replicaset-1"), Some("instance-2"), Some("HA"), None, None, Some(""), Some("localhost1:2222"), None]),
        row_opt(&[Some("replicaset-3"), Some("instance-5"), Some("HA"), None, None, Some(""), Some("localhost3:3333"), None]),
        row_opt(&[Some("replicaset-1"), Some("instance-3"), Some("HA"), None, None, Some(""), Some("localhost1:3333"), None]),
    ]));

    let sets = metadata
        .fetch_instances_from_metadata_server("replicaset-1")
        .await
        .unwrap();

    // the full mapping is returned, not only the requested set
    assert_eq!(sets.len(), 3);
    assert_eq!(sets["replicaset-1"].len(), 3);
    assert_eq!(sets["replicaset-2"].len(), 1);
    assert_eq!(sets["replicaset-3"].len(), 1);

    // declared order within a set is row order
    let uuids: Vec<&str> = sets["replicaset-1"]
        .iter()
        .map(|m| m.server_uuid.as_str())
        .collect();
    assert_eq!(uuids, vec!["instance-1", "instance-2", "instance-3"]);
    assert_eq!(sets["replicaset-1"][1].port, 2222);
    assert_eq!(sets["replicaset-1"][1].xport, 22220);
}

#[tokio::test]
async fn test_fetch_instances_wraps_query_failure() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_metadata(Err("some error(42)".to_string()));

    let err = metadata
        .fetch_instances_from_metadata_server("replicaset-1")
        .await
        .unwrap_err();
    match err {
        RouterError::Metadata(msg) => {
            assert_eq!(msg, "Error executing MySQL query: some error(42)")
        }
        other => panic!("expected metadata error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_instances_requires_connection() {
    let factory = FakeSessionFactory::new(1);
    let metadata = resolver(&factory);

    let err = metadata
        .fetch_instances_from_metadata_server("replicaset-1")
        .await
        .unwrap_err();
    match err {
        RouterError::Metadata(msg) => assert_eq!(msg, "Not connected"),
        other => panic!("expected metadata error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_status_reuses_the_metadata_session() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    // instance-1 shares the metadata server's address, so the pooled session
    // answers both probes and no new session is created
    factory.session(0).push_primary(Ok(primary_rows("instance-1")));
    factory.session(0).push_status(Ok(status_rows_all_online()));

    let mut members = typical_instances();
    let status = metadata
        .update_replicaset_status("replicaset-1", &mut members)
        .await
        .unwrap();

    assert_eq!(status, ReplicaSetStatus::AvailableWritable);
    assert_eq!(factory.create_count(), 1);
    assert_eq!(members[0].mode, ServerMode::ReadWrite);
    assert_eq!(members[1].mode, ServerMode::ReadOnly);
    assert_eq!(members[2].mode, ServerMode::ReadOnly);
}

#[tokio::test]
async fn test_update_status_fails_over_on_primary_query_failure() {
    let factory = FakeSessionFactory::new(2);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_primary(Err("some error(42)".to_string()));
    factory.session(1).allow_connections(&["localhost:3320"]);
    factory.session(1).push_primary(Ok(primary_rows("instance-1")));
    factory.session(1).push_status(Ok(status_rows_all_online()));

    let mut members = typical_instances();
    let status = metadata
        .update_replicaset_status("replicaset-1", &mut members)
        .await
        .unwrap();

    assert_eq!(status, ReplicaSetStatus::AvailableWritable);
    // one failover connection on top of the pooled metadata session
    assert_eq!(factory.create_count(), 2);
    assert_eq!(members[0].mode, ServerMode::ReadWrite);
    assert_eq!(members[1].mode, ServerMode::ReadOnly);
    assert_eq!(members[2].mode, ServerMode::ReadOnly);
}

#[tokio::test]
async fn test_update_status_fails_over_on_status_query_failure() {
    let factory = FakeSessionFactory::new(2);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_primary(Ok(primary_rows("instance-1")));
    factory.session(0).push_status(Err("some error(42)".to_string()));
    factory.session(1).allow_connections(&["localhost:3320"]);
    factory.session(1).push_primary(Ok(primary_rows("instance-1")));
    factory.session(1).push_status(Ok(status_rows_all_online()));

    let mut members = typical_instances();
    let status = metadata
        .update_replicaset_status("replicaset-1", &mut members)
        .await
        .unwrap();

    assert_eq!(status, ReplicaSetStatus::AvailableWritable);
    assert_eq!(factory.create_count(), 2);
}

#[tokio::test]
async fn test_update_status_raises_after_all_members_fail() {
    let factory = FakeSessionFactory::new(3);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_primary(Err("some error(42)".to_string()));
    factory.session(1).allow_connections(&["localhost:3320"]);
    factory.session(1).push_primary(Err("some error(42)".to_string()));
    factory.session(2).allow_connections(&["localhost:3330"]);
    factory.session(2).push_primary(Err("some error(42)".to_string()));

    let mut members = typical_instances();
    let err = metadata
        .update_replicaset_status("replicaset-1", &mut members)
        .await
        .unwrap_err();

    match err {
        RouterError::Metadata(msg) => assert_eq!(
            msg,
            "Unable to fetch live group_replication member data from any server in replicaset 'replicaset-1'"
        ),
        other => panic!("expected metadata error, got {:?}", other),
    }
    assert_eq!(factory.create_count(), 3);
}

#[tokio::test]
async fn test_update_status_skips_members_refusing_connections() {
    let factory = FakeSessionFactory::new(3);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    // member 1: query fails; member 2: connect refused; member 3: status fails
    factory.session(0).push_primary(Err("some error(42)".to_string()));
    factory.session(2).allow_connections(&["localhost:3330"]);
    factory.session(2).push_primary(Ok(primary_rows("instance-1")));
    factory.session(2).push_status(Err("some error(42)".to_string()));

    let mut members = typical_instances();
    let err = metadata
        .update_replicaset_status("replicaset-1", &mut members)
        .await
        .unwrap_err();

    match err {
        RouterError::Metadata(msg) => assert_eq!(
            msg,
            "Unable to fetch live group_replication member data from any server in replicaset 'replicaset-1'"
        ),
        other => panic!("expected metadata error, got {:?}", other),
    }
    assert_eq!(factory.create_count(), 3);
    assert!(factory
        .events()
        .contains(&"connect-fail localhost:3320".to_string()));
}

#[tokio::test]
async fn test_update_status_with_no_elected_primary() {
    let factory = FakeSessionFactory::new(1);
    let mut metadata = resolver(&factory);
    connect_to_first_metadata_server(&factory, &mut metadata).await;

    factory.session(0).push_primary(Ok(primary_rows("")));
    factory.session(0).push_status(Ok(status_rows_all_online()));

    let mut members = typical_instances();
    let status = metadata
        .update_replicaset_status("replicaset-1", &mut members)
        .await
        .unwrap();

    assert_eq!(status, ReplicaSetStatus::AvailableReadOnly);
    assert!(members.iter().all(|m| m.mode == ServerMode::ReadOnly));
}
