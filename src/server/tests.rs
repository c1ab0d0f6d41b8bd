//! Dispatcher Module Tests
//!
//! ## Test Scopes
//! - **LoadBalancer**: Round-robin order, empty rotation, growth of the cycle.
//! - **SatelliteRegistry**: Replace semantics and registration validation.
//! - **SatelliteDirectory**: Concurrent registration and exclusion-aware routing.
//! - **Dispatcher**: Routing over real sockets against scripted satellites.

#[cfg(test)]
mod tests {
    use crate::comm::protocol::*;
    use crate::comm::types::*;
    use crate::error::Error;
    use crate::server::balancer::LoadBalancer;
    use crate::server::directory::SatelliteDirectory;
    use crate::server::dispatcher::{Dispatcher, DispatcherSettings};
    use crate::server::registry::SatelliteRegistry;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    const IO: Duration = Duration::from_secs(2);

    // ============================================================
    // LOAD BALANCER TESTS
    // ============================================================

    #[test]
    fn test_round_robin_order() {
        let mut balancer = LoadBalancer::new();
        balancer.satellite_added("A");
        balancer.satellite_added("B");
        balancer.satellite_added("C");

        let picks: Vec<String> = (0..6).map(|_| balancer.next_satellite().unwrap()).collect();

        assert_eq!(picks, vec!["A", "B", "C", "A", "B", "C"]);
    }

    #[test]
    fn test_added_satellite_joins_cycle_on_next_call() {
        let mut balancer = LoadBalancer::new();
        for name in ["A", "B", "C"] {
            balancer.satellite_added(name);
        }
        for _ in 0..3 {
            balancer.next_satellite().unwrap();
        }

        balancer.satellite_added("D");
        let picks: Vec<String> = (0..5).map(|_| balancer.next_satellite().unwrap()).collect();

        assert_eq!(picks, vec!["D", "A", "B", "C", "D"]);
    }

    #[test]
    fn test_empty_balancer_fails() {
        let mut balancer = LoadBalancer::new();

        assert!(matches!(
            balancer.next_satellite(),
            Err(Error::NoSatellitesAvailable)
        ));
        assert!(balancer.is_empty());
    }

    #[test]
    fn test_duplicate_names_bias_rotation() {
        let mut balancer = LoadBalancer::new();
        balancer.satellite_added("A");
        balancer.satellite_added("B");
        balancer.satellite_added("A");

        let picks: Vec<String> = (0..3).map(|_| balancer.next_satellite().unwrap()).collect();

        assert_eq!(picks, vec!["A", "B", "A"]);
        assert_eq!(balancer.len(), 3);
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[test]
    fn test_registry_replace_semantics() {
        let mut registry = SatelliteRegistry::new();

        registry
            .register(ConnectivityInfo::named("S1", "127.0.0.1", 7001))
            .unwrap();
        let (name, previous) = registry
            .register(ConnectivityInfo::named("S1", "10.0.0.9", 7101))
            .unwrap();

        assert_eq!(name, "S1");
        assert_eq!(previous.unwrap().port, 7001);
        assert_eq!(registry.len(), 1);

        let info = registry.lookup("S1").unwrap();
        assert_eq!(info.host, "10.0.0.9");
        assert_eq!(info.port, 7101);
    }

    #[test]
    fn test_registry_unknown_satellite() {
        let registry = SatelliteRegistry::new();

        match registry.lookup("ghost") {
            Err(Error::UnknownSatellite(name)) => assert_eq!(name, "ghost"),
            other => panic!("Expected UnknownSatellite, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_rejects_nameless_or_unreachable() {
        let mut registry = SatelliteRegistry::new();

        assert!(matches!(
            registry.register(ConnectivityInfo::new("127.0.0.1", 7001)),
            Err(Error::InvalidRegistration(_))
        ));
        assert!(matches!(
            registry.register(ConnectivityInfo::named("", "127.0.0.1", 7001)),
            Err(Error::InvalidRegistration(_))
        ));
        assert!(matches!(
            registry.register(ConnectivityInfo::named("S1", "127.0.0.1", 0)),
            Err(Error::InvalidRegistration(_))
        ));
        assert!(registry.is_empty());
    }

    // ============================================================
    // DIRECTORY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_directory_routes_in_registration_order() {
        let directory = SatelliteDirectory::new();
        directory
            .register(ConnectivityInfo::named("S1", "127.0.0.1", 7001))
            .await
            .unwrap();
        directory
            .register(ConnectivityInfo::named("S2", "127.0.0.1", 7002))
            .await
            .unwrap();

        let (first, first_info) = directory.next_route().await.unwrap();
        let (second, second_info) = directory.next_route().await.unwrap();

        assert_eq!(first, "S1");
        assert_eq!(first_info.port, 7001);
        assert_eq!(second, "S2");
        assert_eq!(second_info.port, 7002);
    }

    #[tokio::test]
    async fn test_directory_concurrent_registration() {
        let directory = SatelliteDirectory::new();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let directory = directory.clone();
                tokio::spawn(async move {
                    directory
                        .register(ConnectivityInfo::named(format!("S{}", i), "127.0.0.1", 7000 + i))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(directory.satellites().await.len(), 2);
        assert!(directory.lookup("S0").await.is_ok());
        assert!(directory.lookup("S1").await.is_ok());

        let mut cycle = vec![
            directory.next_route().await.unwrap().0,
            directory.next_route().await.unwrap().0,
        ];
        cycle.sort();
        assert_eq!(cycle, vec!["S0", "S1"]);
    }

    #[tokio::test]
    async fn test_directory_routing_under_concurrent_registration() {
        let directory = SatelliteDirectory::new();
        directory
            .register(ConnectivityInfo::named("S0", "127.0.0.1", 7000))
            .await
            .unwrap();

        let registering = {
            let directory = directory.clone();
            tokio::spawn(async move {
                for i in 1..50u16 {
                    directory
                        .register(ConnectivityInfo::named(format!("S{}", i), "127.0.0.1", 7000 + i))
                        .await
                        .unwrap();
                }
            })
        };
        let routing = {
            let directory = directory.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    directory.next_route().await.unwrap();
                }
            })
        };

        registering.await.unwrap();
        routing.await.unwrap();
        assert_eq!(directory.rotation_len().await, 50);
    }

    #[tokio::test]
    async fn test_directory_excludes_tried_satellites() {
        let directory = SatelliteDirectory::new();
        for (name, port) in [("S1", 7001), ("S2", 7002)] {
            directory
                .register(ConnectivityInfo::named(name, "127.0.0.1", port))
                .await
                .unwrap();
        }

        let tried = vec!["S1".to_string()];
        assert_eq!(directory.route_excluding(&tried).await.unwrap().0, "S2");
        assert_eq!(directory.route_excluding(&tried).await.unwrap().0, "S2");

        let all = vec!["S1".to_string(), "S2".to_string()];
        assert!(matches!(
            directory.route_excluding(&all).await,
            Err(Error::NoSatellitesAvailable)
        ));
    }

    // ============================================================
    // DISPATCHER TESTS (scripted satellites)
    // ============================================================

    async fn start_dispatcher() -> (ConnectivityInfo, Arc<SatelliteDirectory>) {
        let settings = DispatcherSettings {
            timeouts: Timeouts {
                connect: Duration::from_secs(1),
                io: IO,
                job: Duration::from_secs(5),
            },
            forward_attempts: 3,
        };
        let dispatcher = Dispatcher::bind(&ConnectivityInfo::new("127.0.0.1", 0), settings)
            .await
            .unwrap();
        let port = dispatcher.local_addr().unwrap().port();
        let directory = dispatcher.directory();
        tokio::spawn(dispatcher.run());

        (ConnectivityInfo::new("127.0.0.1", port), directory)
    }

    /// A satellite stand-in that answers every job with `answer`.
    async fn scripted_satellite(answer: serde_json::Value) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let answer = answer.clone();
                tokio::spawn(async move {
                    if let Ok(Message::JobRequest(_)) = read_message(&mut stream, IO).await {
                        write_response(&mut stream, &JobResponse::completed(&answer), IO)
                            .await
                            .unwrap();
                    }
                });
            }
        });

        port
    }

    /// A port nothing listens on.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn register(dispatcher: &ConnectivityInfo, info: ConnectivityInfo) {
        let mut stream = TcpStream::connect(dispatcher.address()).await.unwrap();
        write_message(&mut stream, &Message::RegisterSatellite(info), IO)
            .await
            .unwrap();
    }

    async fn wait_for_satellites(directory: &SatelliteDirectory, count: usize) {
        for _ in 0..100 {
            if directory.rotation_len().await >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Satellites never registered");
    }

    async fn submit(dispatcher: &ConnectivityInfo, job: Job) -> JobResponse {
        let mut stream = TcpStream::connect(dispatcher.address()).await.unwrap();
        write_message(&mut stream, &Message::JobRequest(job), IO)
            .await
            .unwrap();
        read_response(&mut stream, Duration::from_secs(10)).await.unwrap()
    }

    #[tokio::test]
    async fn test_dispatcher_without_satellites_answers_failure() {
        let (dispatcher, _directory) = start_dispatcher().await;

        let response = submit(&dispatcher, Job::new("Echo", &5).unwrap()).await;

        match response {
            JobResponse::Failed { kind, .. } => {
                assert_eq!(kind, FailureKind::NoSatellitesAvailable)
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_relays_satellite_result() {
        let (dispatcher, directory) = start_dispatcher().await;
        let port = scripted_satellite(serde_json::json!("from S1")).await;

        register(&dispatcher, ConnectivityInfo::named("S1", "127.0.0.1", port)).await;
        wait_for_satellites(&directory, 1).await;

        let response = submit(&dispatcher, Job::new("Echo", &5).unwrap()).await;
        assert_eq!(response.into_result().unwrap(), serde_json::json!("from S1"));
    }

    #[tokio::test]
    async fn test_dispatcher_alternates_between_satellites() {
        let (dispatcher, directory) = start_dispatcher().await;
        let s1 = scripted_satellite(serde_json::json!("S1")).await;
        let s2 = scripted_satellite(serde_json::json!("S2")).await;

        register(&dispatcher, ConnectivityInfo::named("S1", "127.0.0.1", s1)).await;
        wait_for_satellites(&directory, 1).await;
        register(&dispatcher, ConnectivityInfo::named("S2", "127.0.0.1", s2)).await;
        wait_for_satellites(&directory, 2).await;

        let mut served_by = Vec::new();
        for _ in 0..4 {
            let response = submit(&dispatcher, Job::new("Echo", &5).unwrap()).await;
            served_by.push(response.into_result().unwrap());
        }

        assert_eq!(
            served_by,
            vec![
                serde_json::json!("S1"),
                serde_json::json!("S2"),
                serde_json::json!("S1"),
                serde_json::json!("S2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatcher_retries_unreachable_satellite() {
        let (dispatcher, directory) = start_dispatcher().await;
        let dead = closed_port().await;
        let alive = scripted_satellite(serde_json::json!("alive")).await;

        register(&dispatcher, ConnectivityInfo::named("dead", "127.0.0.1", dead)).await;
        wait_for_satellites(&directory, 1).await;
        register(&dispatcher, ConnectivityInfo::named("alive", "127.0.0.1", alive)).await;
        wait_for_satellites(&directory, 2).await;

        let response = submit(&dispatcher, Job::new("Echo", &5).unwrap()).await;
        assert_eq!(response.into_result().unwrap(), serde_json::json!("alive"));
    }

    #[tokio::test]
    async fn test_dispatcher_reports_connection_failure_when_all_unreachable() {
        let (dispatcher, directory) = start_dispatcher().await;
        let dead = closed_port().await;

        register(&dispatcher, ConnectivityInfo::named("dead", "127.0.0.1", dead)).await;
        wait_for_satellites(&directory, 1).await;

        match submit(&dispatcher, Job::new("Echo", &5).unwrap()).await {
            JobResponse::Failed { kind, .. } => assert_eq!(kind, FailureKind::Connection),
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_closes_on_unknown_kind() {
        let (dispatcher, _directory) = start_dispatcher().await;
        let mut stream = TcpStream::connect(dispatcher.address()).await.unwrap();

        let frame = Frame {
            tag: 77,
            payload: vec![0, 1, 2],
        };
        write_frame(&mut stream, &frame, IO).await.unwrap();

        assert!(read_response(&mut stream, IO).await.is_err());
    }

    #[tokio::test]
    async fn test_dispatcher_ignores_invalid_registration() {
        let (dispatcher, directory) = start_dispatcher().await;

        register(&dispatcher, ConnectivityInfo::new("127.0.0.1", 7001)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(directory.rotation_len().await, 0);
    }
}
