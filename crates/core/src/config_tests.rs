// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

const MINIMAL: &str = r#"
database:
  path: /var/lib/gantry/state.db
broker:
  url: /var/lib/gantry/broker.db
"#;

const FULL: &str = r#"
database:
  path: state.db
broker:
  url: broker.db
queues:
  conductor: conductor_queue
workflows:
  default_qa: [run_interpreter, run_moqui_sim]
remote_commands:
  run_interpreter: "interpreter --case {case_id} --gpu {gpu_id} --plan {rtplan_path}"
  run_moqui_sim: "moqui --in {in_dir} --out {out_dir}"
conductor:
  remote_paths:
    upload_dir: /data/upload
    download_dir: /data/download
curator:
  monitor_interval_sec: 15
processes:
  conductor:
    enabled: true
  remote_executor:
    enabled: true
    restart_delay_sec: 10
hpc:
  enabled: true
  host: hpc.example.org
  user: qa
  ssh_key_path: /home/qa/.ssh/id_ed25519
messaging:
  max_retries: 5
logging:
  level: debug
  to_store: true
"#;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn minimal_config_loads_with_defaults() {
    let file = write_config(MINIMAL);
    let config = AppConfig::load(file.path()).unwrap();

    assert_eq!(config.queues.conductor, "conductor_queue");
    assert_eq!(config.queues.system_curator, "system_curator_queue");
    assert_eq!(config.curator.monitor_interval_sec, 60);
    assert_eq!(config.messaging.max_retries, 3);
    assert_eq!(config.conductor.remote_paths.upload_dir, "/data");
    assert!(!config.hpc.enabled);
    assert!(config.workflows.default_qa.is_empty());
}

#[test]
fn full_config_loads() {
    let file = write_config(FULL);
    let config = AppConfig::load(file.path()).unwrap();

    assert_eq!(config.workflows.default_qa, vec!["run_interpreter", "run_moqui_sim"]);
    assert_eq!(config.curator.monitor_interval_sec, 15);
    assert_eq!(config.messaging.max_retries, 5);
    assert!(config.logging.to_store);
    assert_eq!(config.hpc.port, 22);
    assert_eq!(config.processes["remote_executor"].restart_delay_sec, 10);
    assert_eq!(config.processes["remote_executor"].max_restart_attempts, 10);
}

#[test]
fn missing_file_is_a_read_error() {
    let err = AppConfig::load(Path::new("/nonexistent/gantry.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn workflow_step_without_template_is_rejected() {
    let text = format!("{MINIMAL}\nworkflows:\n  default_qa: [mystery_step]\n");
    let file = write_config(&text);
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("mystery_step"), "got: {err}");
}

#[test]
fn hpc_enabled_requires_host_and_user() {
    let text = format!("{MINIMAL}\nhpc:\n  enabled: true\n");
    let file = write_config(&text);
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("hpc.host"), "got: {err}");
}

#[test]
fn remote_process_requires_remote_command() {
    let text = format!("{MINIMAL}\nprocesses:\n  curator:\n    remote: true\n");
    let file = write_config(&text);
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("remote_command"), "got: {err}");
}
