#[cfg(test)]
mod lifecycle_tests {
    use edgesim::config::{Api, ExperimentConfig, Mode};
    use edgesim::orchestrator::Experiment;
    use edgesim::platform::{EmulationPlatform, LocalPlatform, PlatformError, RealizedNetwork};
    use edgesim::topology::NetworkPlan;
    use serde_json::Value;
    use std::cell::Cell;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn script(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Config running well-behaved fake servers and clients from `dir`
    fn setup(dir: &TempDir) -> ExperimentConfig {
        let root = dir.path();
        script(&root.join("origin/run.sh"), "exec sleep 30");
        script(&root.join("edge/run.sh"), "exec sleep 30");
        script(&root.join("client/main.sh"), "echo \"$@\"\nexec sleep 30");

        let mut config = ExperimentConfig::default();
        config.general.api = Some(Api::Flights);
        config.general.mode = Some(Mode::Proxy);
        config.general.log_dir = root.join("logs");
        config.network.total_cores = Some(32);
        config.scale.interval = Duration::ZERO;
        config.scale.batch_size = 2;
        config.scale.batches = 3;
        config.servers.origin.dir = root.join("origin");
        config.servers.origin.command = "run.sh".into();
        config.servers.edge.dir = root.join("edge");
        config.servers.edge.command = "run.sh".into();
        config.servers.client_binary = root.join("client/main.sh");
        config.timeouts.warmup = Duration::ZERO;
        config.timeouts.settle = Duration::from_millis(300);
        config.timeouts.shutdown = Duration::from_secs(5);
        config.timeouts.origin_shutdown = Some(Duration::from_secs(5));
        config
    }

    fn events(dir: &TempDir) -> Vec<Value> {
        fs::read_to_string(dir.path().join("logs/events.log"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn of_type<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
        events.iter().filter(|e| e["type"] == kind).collect()
    }

    #[test]
    fn test_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = Experiment::new(setup(&dir)).unwrap();

        let summary = experiment.run(&LocalPlatform::new()).unwrap();
        assert_eq!(summary.active_clients, 6);
        assert_eq!(summary.failed_clients, 0);
        assert!(!summary.cancelled);
        assert!(summary.shutdown.iter().all(|phase| phase.timed_out == 0));

        let events = events(&dir);
        let updates: Vec<u64> = of_type(&events, "Update")
            .iter()
            .map(|e| e["active_clients"].as_u64().unwrap())
            .collect();
        assert_eq!(updates, vec![0, 2, 4, 6]);
        assert_eq!(of_type(&events, "ClientStarted").len(), 6);
        assert_eq!(of_type(&events, "Topology")[0]["clients"], 6);

        let shutdown: Vec<&str> = of_type(&events, "Shutdown")
            .iter()
            .map(|e| e["role"].as_str().unwrap())
            .collect();
        assert_eq!(shutdown, vec!["client", "edge", "origin"]);
        assert_eq!(events.last().unwrap()["type"], "Summary");

        let logs = dir.path().join("logs");
        assert!(logs.join("topology.json").exists());
        assert!(logs.join("origin.log").exists());
        assert!(logs.join("edge_server_4.err.log").exists());
        let client = fs::read_to_string(logs.join("client_5.log")).unwrap();
        assert_eq!(client.trim(), "--api flights --mode proxy --edge-server 10.1.0.1:8005 --client-number 5");
    }

    #[test]
    fn test_degraded_edge_fails_its_clients() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(&dir);
        // e2 sits at 10.0.0.3 on the backbone
        script(
            &dir.path().join("edge/run.sh"),
            "if [ \"$HOST_NAME\" = 10.0.0.3 ]; then exit 1; fi\nexec sleep 30",
        );
        let experiment = Experiment::new(config).unwrap();

        let summary = experiment.run(&LocalPlatform::new()).unwrap();
        assert_eq!(summary.active_clients, 6);
        assert_eq!(summary.failed_clients, 1);

        let events = events(&dir);
        let errors = of_type(&events, "Error");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["role"], "client");
        assert_eq!(errors[0]["index"], 1);
        assert!(of_type(&events, "ClientStarted").iter().all(|e| e["edge"] != 1));
    }

    #[test]
    fn test_origin_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(&dir);
        // Executable, but the interpreter does not exist
        fs::write(dir.path().join("origin/run.sh"), "#!/nonexistent/interpreter\n").unwrap();
        let experiment = Experiment::new(config).unwrap();

        let err = experiment.run(&LocalPlatform::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("control-plane"));

        let events = events(&dir);
        let errors = of_type(&events, "Error");
        assert_eq!(errors.last().unwrap()["phase"], "control-plane");
        assert!(of_type(&events, "ClientStarted").is_empty());
        assert!(of_type(&events, "Summary").is_empty());
    }

    /// Local platform that counts how often a network was realized
    #[derive(Default)]
    struct CountingPlatform {
        inner: LocalPlatform,
        realized: Cell<usize>,
    }

    impl EmulationPlatform for CountingPlatform {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn realize(&self, plan: &NetworkPlan) -> Result<Box<dyn RealizedNetwork>, PlatformError> {
            self.realized.set(self.realized.get() + 1);
            self.inner.realize(plan)
        }
    }

    #[test]
    fn test_undersized_backbone_fails_before_anything_starts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(&dir);
        // Room for the origin and one edge only
        config.network.backbone = "10.0.0.0/30".parse().unwrap();
        let experiment = Experiment::new(config).unwrap();

        let platform = CountingPlatform::default();
        let err = experiment.run(&platform).unwrap_err();
        assert!(format!("{:#}", err).contains("experiment failed during plan"));
        assert_eq!(platform.realized.get(), 0);

        let events = events(&dir);
        let errors = of_type(&events, "Error");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["phase"], "plan");
        assert!(of_type(&events, "Topology").is_empty());
        assert!(of_type(&events, "Shutdown").is_empty());

        let logs = dir.path().join("logs");
        assert!(!logs.join("topology.json").exists());
        assert!(!logs.join("origin.log").exists());
        assert!(!logs.join("edge_server_0.log").exists());
    }

    #[test]
    fn test_interrupt_stops_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(&dir);
        config.scale.interval = Duration::from_secs(30);
        config.scale.batch_size = 1;
        config.scale.batches = 50;
        let experiment = Experiment::new(config).unwrap();

        let token = experiment.cancellation_token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(800));
            token.cancel();
        });
        let started = Instant::now();
        let summary = experiment.run(&LocalPlatform::new()).unwrap();
        canceller.join().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.active_clients, 1);
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[test]
    fn test_shutdown_bounded_when_interrupt_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(&dir);
        script(&dir.path().join("client/main.sh"), "trap '' INT\nsleep 4");
        config.timeouts.shutdown = Duration::from_millis(300);
        let experiment = Experiment::new(config).unwrap();

        let started = Instant::now();
        let summary = experiment.run(&LocalPlatform::new()).unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(summary.shutdown[0].timed_out, 6);
        assert_eq!(summary.shutdown[1].timed_out, 0);
    }
}
