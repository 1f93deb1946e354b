//! Workflow tests against a scripted fake device

use apphost_upgrade::{
    run_all, upgrade_device, CommandResult, ConnectError, Connector, Credentials, DeviceChannel,
    DeviceTarget, DriverError, NoAppPolicy, UpgradeConfig, UpgradeStatus, WaitPolicy,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const URL: &str = "https://downloads.example.com/enterprise-agent/te-agent-5.0.1.cisco.tar";

const LISTING_RUNNING: &str = "App id                                   State\r\n\
---------------------------------------------------------\r\n\
APPX                                     RUNNING\r\n";

const LISTING_DEPLOYED: &str = "App id                                   State\r\n\
---------------------------------------------------------\r\n\
APPX                                     DEPLOYED\r\n";

const DIR_PRESENT: &str = "Directory of bootflash:/apps/\r\n\r\nNo files in directory\r\n";
const DIR_MISSING: &str = "%Error opening bootflash:/apps (No such file or directory)\r\n";

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Issue {
        address: String,
        command: String,
        wait: WaitPolicy,
    },
    Settle {
        address: String,
    },
    Close {
        address: String,
    },
}

type Log = Arc<Mutex<Vec<Event>>>;

/// Scripted replies for one device.
#[derive(Clone)]
struct Script {
    listing: String,
    dir: String,
    mkdir: String,
    copy: String,
    upgrade: String,
    /// Commands starting with this prefix fail with EOF
    fail_on: Option<&'static str>,
    /// Commands starting with this prefix never answer
    hang_on: Option<&'static str>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            listing: LISTING_RUNNING.to_string(),
            dir: DIR_PRESENT.to_string(),
            mkdir: "Create directory filename [apps]? ".to_string(),
            copy: "Accessing https://downloads.example.com/...\r\nLoading !!!!!!\r\n".to_string(),
            upgrade: "Upgrading app APPX. Please wait...\r\n".to_string(),
            fail_on: None,
            hang_on: None,
        }
    }
}

impl Script {
    fn reply(&self, command: &str) -> String {
        if command == "show app-hosting list" {
            self.listing.clone()
        } else if command.starts_with("dir ") {
            self.dir.clone()
        } else if command.starts_with("mkdir ") {
            self.mkdir.clone()
        } else if command.starts_with("copy ") {
            self.copy.clone()
        } else if command.starts_with("app-hosting upgrade") {
            self.upgrade.clone()
        } else {
            String::new()
        }
    }
}

struct FakeChannel {
    address: String,
    script: Script,
    log: Log,
}

impl DeviceChannel for FakeChannel {
    async fn issue(&mut self, command: &str, wait: WaitPolicy) -> Result<CommandResult, DriverError> {
        self.log.lock().unwrap().push(Event::Issue {
            address: self.address.clone(),
            command: command.to_string(),
            wait,
        });
        if let Some(prefix) = self.script.hang_on {
            if command.starts_with(prefix) {
                std::future::pending::<()>().await;
            }
        }
        if let Some(prefix) = self.script.fail_on {
            if command.starts_with(prefix) {
                return Err(DriverError::Eof);
            }
        }
        Ok(CommandResult::new(command, self.script.reply(command)))
    }

    async fn settle(&mut self, _timeout: Duration) -> Result<CommandResult, DriverError> {
        self.log.lock().unwrap().push(Event::Settle {
            address: self.address.clone(),
        });
        Ok(CommandResult::new("", "[OK - 1024 bytes]\r\n"))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.log.lock().unwrap().push(Event::Close {
            address: self.address.clone(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct FakeConnector {
    scripts: HashMap<String, Script>,
    log: Log,
}

impl FakeConnector {
    fn with(mut self, address: &str, script: Script) -> Self {
        self.scripts.insert(address.to_string(), script);
        self
    }

    fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    fn commands(&self, address: &str) -> Vec<(String, WaitPolicy)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Issue {
                    address: a,
                    command,
                    wait,
                } if a == address => Some((command, wait)),
                _ => None,
            })
            .collect()
    }

    fn close_count(&self, address: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Close { address: a } if a == address))
            .count()
    }
}

impl Connector for FakeConnector {
    type Channel = FakeChannel;

    async fn open(&self, target: &DeviceTarget) -> Result<FakeChannel, DriverError> {
        match self.scripts.get(&target.address) {
            Some(script) => Ok(FakeChannel {
                address: target.address.clone(),
                script: script.clone(),
                log: self.log.clone(),
            }),
            None => Err(ConnectError::Unreachable {
                address: target.address.clone(),
                reason: "No route to host".to_string(),
            }
            .into()),
        }
    }
}

fn config() -> UpgradeConfig {
    let mut config = UpgradeConfig::new(URL);
    config.command_delay_secs = 1;
    config.transfer_delay_secs = 7;
    config
}

fn target(address: &str) -> DeviceTarget {
    DeviceTarget::new(address, Credentials::new("admin", "pw"))
}

fn blind_sends(commands: &[(String, WaitPolicy)]) -> Vec<WaitPolicy> {
    commands
        .iter()
        .filter(|(c, _)| c.is_empty())
        .map(|(_, w)| *w)
        .collect()
}

#[tokio::test]
async fn test_happy_path_upgrades_running_app() {
    let connector = FakeConnector::default().with("r1", Script::default());

    let outcome = upgrade_device(&connector, &target("r1"), &config()).await;

    assert_eq!(outcome.address, "r1");
    match &outcome.status {
        UpgradeStatus::Upgraded { app_id, response } => {
            assert_eq!(app_id, "APPX");
            assert!(response.contains("Upgrading app APPX"));
        }
        other => panic!("unexpected status: {:?}", other),
    }

    let commands: Vec<String> = connector.commands("r1").into_iter().map(|(c, _)| c).collect();
    assert_eq!(
        commands,
        vec![
            "show app-hosting list".to_string(),
            "dir bootflash:/apps".to_string(),
            format!("copy {} bootflash:/apps", URL),
            "app-hosting upgrade appid APPX package bootflash:/apps/te-agent-5.0.1.cisco.tar"
                .to_string(),
        ]
    );
    assert_eq!(connector.close_count("r1"), 1);
}

#[tokio::test]
async fn test_wait_policies_per_step() {
    let connector = FakeConnector::default().with("r1", Script::default());
    upgrade_device(&connector, &target("r1"), &config()).await;

    let commands = connector.commands("r1");
    assert_eq!(commands[0].1, WaitPolicy::Prompt);
    assert_eq!(commands[1].1, WaitPolicy::Prompt);
    assert_eq!(commands[2].1, WaitPolicy::Delay(Duration::from_secs(7)));
    assert_eq!(commands[3].1, WaitPolicy::Prompt);
}

#[tokio::test]
async fn test_no_running_app_skips_without_further_steps() {
    let script = Script {
        listing: LISTING_DEPLOYED.to_string(),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);

    let outcome = upgrade_device(&connector, &target("r1"), &config()).await;

    assert_eq!(outcome.status, UpgradeStatus::SkippedNoApp);
    assert_eq!(connector.commands("r1").len(), 1);
    assert_eq!(connector.close_count("r1"), 1);
}

#[tokio::test]
async fn test_fallback_app_id_policy() {
    let script = Script {
        listing: "No App found\r\n".to_string(),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);
    let mut config = config();
    config.no_app_policy = NoAppPolicy::Fallback("te".to_string());

    let outcome = upgrade_device(&connector, &target("r1"), &config).await;

    assert!(matches!(
        &outcome.status,
        UpgradeStatus::Upgraded { app_id, .. } if app_id == "te"
    ));
    let last = connector.commands("r1").pop().unwrap().0;
    assert!(last.starts_with("app-hosting upgrade appid te package "));
}

#[tokio::test]
async fn test_missing_directory_is_created_once() {
    let script = Script {
        dir: DIR_MISSING.to_string(),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);

    upgrade_device(&connector, &target("r1"), &config()).await;

    let commands = connector.commands("r1");
    let mkdirs: Vec<_> = commands
        .iter()
        .filter(|(c, _)| c.starts_with("mkdir "))
        .collect();
    assert_eq!(mkdirs.len(), 1);
    assert_eq!(mkdirs[0].0, "mkdir bootflash:/apps");
    assert_eq!(mkdirs[0].1, WaitPolicy::Delay(Duration::from_secs(1)));

    // The "[apps]" echo is answered with one continuation right after mkdir.
    let mkdir_at = commands.iter().position(|(c, _)| c.starts_with("mkdir ")).unwrap();
    assert_eq!(commands[mkdir_at + 1].0, "");
}

#[tokio::test]
async fn test_mkdir_without_confirmation_sends_no_continuation() {
    let script = Script {
        dir: DIR_MISSING.to_string(),
        mkdir: "Created dir bootflash:/apps\r\n".to_string(),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);

    upgrade_device(&connector, &target("r1"), &config()).await;

    assert!(blind_sends(&connector.commands("r1")).is_empty());
}

#[tokio::test]
async fn test_existing_directory_is_not_created() {
    let connector = FakeConnector::default().with("r1", Script::default());

    upgrade_device(&connector, &target("r1"), &config()).await;

    assert!(!connector
        .commands("r1")
        .iter()
        .any(|(c, _)| c.starts_with("mkdir")));
}

#[tokio::test]
async fn test_obfuscated_url_skips_before_copy() {
    let connector = FakeConnector::default().with("r1", Script::default());
    let mut config = config();
    config.package_url =
        "https://urldefense.com/v3/__https://downloads.example.com/te.tar__;!!abc$".to_string();

    let outcome = upgrade_device(&connector, &target("r1"), &config).await;

    assert_eq!(outcome.status, UpgradeStatus::SkippedObfuscatedSource);
    assert!(!connector
        .commands("r1")
        .iter()
        .any(|(c, _)| c.starts_with("copy ")));
    assert_eq!(connector.close_count("r1"), 1);
}

#[tokio::test]
async fn test_copy_prompts_answered_in_order() {
    let script = Script {
        copy: "Destination filename [te-agent-5.0.1.cisco.tar]? \r\n\
%Warning:There is a file already existing with this name\r\n\
Do you want to over write? [confirm]"
            .to_string(),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);

    upgrade_device(&connector, &target("r1"), &config()).await;

    assert_eq!(
        blind_sends(&connector.commands("r1")),
        vec![
            WaitPolicy::Delay(Duration::from_secs(1)),
            WaitPolicy::Delay(Duration::from_secs(7)),
        ]
    );

    // Both continuations come after the copy and before the transfer settles.
    let events = connector.events();
    let copy_at = events
        .iter()
        .position(|e| matches!(e, Event::Issue { command, .. } if command.starts_with("copy ")))
        .unwrap();
    let settle_at = events
        .iter()
        .position(|e| matches!(e, Event::Settle { .. }))
        .unwrap();
    let between = events[copy_at + 1..settle_at]
        .iter()
        .filter(|e| matches!(e, Event::Issue { command, .. } if command.is_empty()))
        .count();
    assert_eq!(between, 2);
}

#[tokio::test]
async fn test_copy_without_prompts_sends_nothing_extra() {
    let connector = FakeConnector::default().with("r1", Script::default());

    upgrade_device(&connector, &target("r1"), &config()).await;

    assert!(blind_sends(&connector.commands("r1")).is_empty());
}

#[tokio::test]
async fn test_quiet_file_prompts_precedes_copy() {
    let connector = FakeConnector::default().with("r1", Script::default());
    let mut config = config();
    config.quiet_file_prompts = true;

    upgrade_device(&connector, &target("r1"), &config).await;

    let commands: Vec<String> = connector.commands("r1").into_iter().map(|(c, _)| c).collect();
    let quiet_at = commands.iter().position(|c| c == "file prompt quiet").unwrap();
    assert!(commands[quiet_at + 1].starts_with("copy "));
}

#[tokio::test]
async fn test_command_fault_is_recorded_and_session_closed() {
    let script = Script {
        fail_on: Some("copy "),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);

    let outcome = upgrade_device(&connector, &target("r1"), &config()).await;

    assert_eq!(
        outcome.status,
        UpgradeStatus::Failed("Session closed by remote end".to_string())
    );
    assert_eq!(connector.close_count("r1"), 1);
}

#[tokio::test]
async fn test_unreachable_device_fails_without_close() {
    let connector = FakeConnector::default();

    let outcome = upgrade_device(&connector, &target("10.9.9.9"), &config()).await;

    assert_eq!(
        outcome.status,
        UpgradeStatus::Failed("Device 10.9.9.9 unreachable: No route to host".to_string())
    );
    assert_eq!(connector.close_count("10.9.9.9"), 0);
}

#[tokio::test]
async fn test_device_timeout_fails_and_closes() {
    let script = Script {
        hang_on: Some("dir "),
        ..Script::default()
    };
    let connector = FakeConnector::default().with("r1", script);
    let mut config = config();
    config.device_timeout_secs = 1;

    let outcome = upgrade_device(&connector, &target("r1"), &config).await;

    match outcome.status {
        UpgradeStatus::Failed(reason) => assert!(reason.contains("timed out")),
        other => panic!("unexpected status: {:?}", other),
    }
    assert_eq!(connector.close_count("r1"), 1);
}

#[tokio::test]
async fn test_failures_do_not_stop_the_run() {
    let connector = FakeConnector::default()
        .with(
            "r1",
            Script {
                fail_on: Some("show "),
                ..Script::default()
            },
        )
        .with("r3", Script::default());
    let targets = vec![target("r1"), target("r2"), target("r3")];

    let outcomes = run_all(&connector, &targets, &config()).await;

    let addresses: Vec<&str> = outcomes.iter().map(|o| o.address.as_str()).collect();
    assert_eq!(addresses, vec!["r1", "r2", "r3"]);
    assert!(matches!(outcomes[0].status, UpgradeStatus::Failed(_)));
    assert!(matches!(outcomes[1].status, UpgradeStatus::Failed(_)));
    assert!(matches!(outcomes[2].status, UpgradeStatus::Upgraded { .. }));
}

#[tokio::test]
async fn test_devices_run_sequentially() {
    let connector = FakeConnector::default()
        .with("r1", Script::default())
        .with("r2", Script::default());
    let targets = vec![target("r1"), target("r2")];

    run_all(&connector, &targets, &config()).await;

    // Every r1 event, including its close, precedes every r2 event.
    let events = connector.events();
    let last_r1 = events
        .iter()
        .rposition(|e| matches!(e, Event::Close { address } if address == "r1"))
        .unwrap();
    let first_r2 = events
        .iter()
        .position(|e| match e {
            Event::Issue { address, .. }
            | Event::Settle { address }
            | Event::Close { address } => address == "r2",
        })
        .unwrap();
    assert!(last_r1 < first_r2);
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Upgrade,
    NoApp,
    Fault,
    Unreachable,
}

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        Just(Kind::Upgrade),
        Just(Kind::NoApp),
        Just(Kind::Fault),
        Just(Kind::Unreachable),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_one_outcome_per_device_and_one_close_per_session(kinds in proptest::collection::vec(kind(), 0..12)) {
        let mut connector = FakeConnector::default();
        let mut targets = Vec::new();
        for (i, k) in kinds.iter().enumerate() {
            let address = format!("dev{}", i);
            let script = match k {
                Kind::Upgrade => Some(Script::default()),
                Kind::NoApp => Some(Script { listing: LISTING_DEPLOYED.to_string(), ..Script::default() }),
                Kind::Fault => Some(Script { fail_on: Some("dir "), ..Script::default() }),
                Kind::Unreachable => None,
            };
            if let Some(script) = script {
                connector = connector.with(&address, script);
            }
            targets.push(target(&address));
        }

        let outcomes = tokio_test::block_on(run_all(&connector, &targets, &config()));

        prop_assert_eq!(outcomes.len(), kinds.len());
        for (i, (outcome, k)) in outcomes.iter().zip(&kinds).enumerate() {
            let address = format!("dev{}", i);
            prop_assert_eq!(&outcome.address, &address);
            let expected_closes = if matches!(k, Kind::Unreachable) { 0 } else { 1 };
            prop_assert_eq!(connector.close_count(&address), expected_closes);
            match k {
                Kind::Upgrade => prop_assert!(
                    matches!(outcome.status, UpgradeStatus::Upgraded { .. }),
                    "expected upgrade, got {:?}", outcome.status
                ),
                Kind::NoApp => prop_assert_eq!(&outcome.status, &UpgradeStatus::SkippedNoApp),
                Kind::Fault | Kind::Unreachable => prop_assert!(
                    matches!(outcome.status, UpgradeStatus::Failed(_)),
                    "expected failure, got {:?}", outcome.status
                ),
            }
        }
    }
}
