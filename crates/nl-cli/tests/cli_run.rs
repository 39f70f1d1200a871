use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use nl_core::SchemaVersion;
use nl_io::{MemorySource, record_batch_from_memory, write_parquet};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ntloop"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let dir = std::env::temp_dir().join(format!("ntloop_cli_{name}_{}_{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path()).args(args).output().unwrap_or_else(|e| panic!("failed to run ntloop: {e}"))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(
        out.status.success(),
        "ntloop failed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

fn write(dir: &Path, file: &str, source: MemorySource) -> PathBuf {
    let path = dir.join(file);
    write_parquet(&path, &record_batch_from_memory(&source).unwrap()).unwrap();
    path
}

fn leptons(b: nl_io::MemorySourceBuilder, prefix: &str, pt: Vec<Vec<f32>>, charge: Vec<Vec<f32>>) -> nl_io::MemorySourceBuilder {
    let zeros: Vec<Vec<f32>> = pt.iter().map(|v| vec![0.0; v.len()]).collect();
    let phi: Vec<Vec<f32>> = pt.iter().map(|v| (0..v.len()).map(|i| 2.5 * i as f32).collect()).collect();
    b.column(format!("{prefix}_pt"), pt.clone())
        .column(format!("{prefix}_eta"), zeros)
        .column(format!("{prefix}_phi"), phi)
        .column(format!("{prefix}_e"), pt)
        .column(format!("{prefix}_charge"), charge)
}

/// Reco keys (1,1) (1,2) (1,3); particle keys (1,2) (1,3) (1,4).
fn fixture(dir: &Path) {
    let reco = MemorySource::builder("reco", SchemaVersion(29))
        .column("eventNumber", vec![1u64, 2, 3])
        .column("runNumber", vec![1u32, 1, 1])
        .column("met_met", vec![10_000.0f32, 20_000.0, 30_000.0])
        .column("met_phi", vec![0.0f32, 1.0, 2.0])
        .column("weight_mc", vec![1.0f32, 1.0, 2.0])
        .column("el_tight", vec![vec![1i8, 1], vec![], vec![1]]);
    let reco = leptons(
        reco,
        "el",
        vec![vec![40_000.0, 30_000.0], vec![], vec![35_000.0]],
        vec![vec![-1.0, 1.0], vec![], vec![1.0]],
    );
    let reco = leptons(
        reco,
        "mu",
        vec![vec![], vec![50_000.0, 20_000.0], vec![45_000.0]],
        vec![vec![], vec![1.0, -1.0], vec![1.0]],
    );
    write(dir, "reco.parquet", reco.build().unwrap());

    let particle = MemorySource::builder("particle", SchemaVersion(29))
        .column("eventNumber", vec![2u64, 3, 4])
        .column("runNumber", vec![1u32, 1, 1]);
    let particle = leptons(
        particle,
        "mu",
        vec![vec![49_000.0, 21_000.0], vec![44_000.0], vec![]],
        vec![vec![1.0, -1.0], vec![1.0], vec![]],
    );
    write(dir, "particle.parquet", particle.build().unwrap());

    let weights = MemorySource::builder("weights", SchemaVersion(29))
        .column("dsid", vec![410_472i32, 410_472])
        .column("totalEventsWeighted", vec![100.0f32, 50.0])
        .build()
        .unwrap();
    write(dir, "weights.parquet", weights);
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("job.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn run_reco_standard_reports_yields() {
    let dir = tmp_dir("run");
    fixture(&dir);
    let cfg = write_config(
        &dir,
        "reco: reco.parquet\nparticle: particle.parquet\nweights: weights.parquet\nloop_mode: reco_standard\nprogress: false\n",
    );

    let v = stdout_json(&run(&["run", "--config", cfg.to_str().unwrap()]));
    assert_eq!(v["algorithm"], "dilepton_summary");
    assert_eq!(v["run"]["mode"], "reco_standard");
    assert_eq!(v["run"]["events"], 3);
    assert_eq!(v["run"]["table"]["paired"], 2);
    assert_eq!(v["run"]["weights"]["sum_weights"], 150.0);
    assert_eq!(v["reco_events"], 3);
    assert_eq!(v["matched_events"], 2);
    assert_eq!(v["particle_dilepton"], 1);
    assert_eq!(v["dilepton"]["elel_os"]["events"], 1);
    assert_eq!(v["dilepton"]["mumu_os"]["events"], 1);
    assert_eq!(v["dilepton"]["elmu_ss"]["weighted"], 2.0);
}

#[test]
fn loop_mode_flag_overrides_config_and_output_goes_to_file() {
    let dir = tmp_dir("particle_all");
    fixture(&dir);
    let cfg = write_config(&dir, "reco: reco.parquet\nparticle: particle.parquet\nprogress: false\n");
    let report = dir.join("report.json");

    let out = run(&[
        "run",
        "--config",
        cfg.to_str().unwrap(),
        "--loop-mode",
        "particle_all",
        "--output",
        report.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&report).unwrap()).unwrap();
    assert_eq!(v["run"]["mode"], "particle_all");
    assert_eq!(v["run"]["events"], 4);
    assert_eq!(v["particle_events"], 3);
    assert_eq!(v["reco_events"], 3);
    assert!(v["run"]["weights"].is_null());
}

#[test]
fn json_config_is_accepted() {
    let dir = tmp_dir("json");
    fixture(&dir);
    let path = dir.join("job.json");
    std::fs::write(&path, r#"{ "reco": "reco.parquet", "loop_mode": "reco_only", "progress": false }"#).unwrap();

    let v = stdout_json(&run(&["run", "-c", path.to_str().unwrap()]));
    assert_eq!(v["run"]["mode"], "reco_only");
    assert!(v["run"]["table"].is_null());
}

#[test]
fn particle_mode_without_particle_input_fails() {
    let dir = tmp_dir("missing");
    fixture(&dir);
    let cfg = write_config(&dir, "reco: reco.parquet\nloop_mode: particle_only\n");

    let out = run(&["run", "--config", cfg.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Configuration error"), "stderr={stderr}");
}

#[test]
fn index_prints_correspondence_summary() {
    let dir = tmp_dir("index");
    fixture(&dir);
    let reco = dir.join("reco.parquet");
    let particle = dir.join("particle.parquet");

    let v = stdout_json(&run(&[
        "index",
        "--reco",
        reco.to_str().unwrap(),
        "--particle",
        particle.to_str().unwrap(),
        "--full",
    ]));
    assert_eq!(v["reco_entries"], 3);
    assert_eq!(v["summary"]["paired"], 2);
    assert_eq!(v["summary"]["reco_only"], 1);
    assert_eq!(v["summary"]["particle_only"], 1);
    assert_eq!(v["paired"], serde_json::json!([[1, 0], [2, 1]]));
    assert_eq!(v["reco_only"], serde_json::json!([0]));
    assert_eq!(v["particle_only"], serde_json::json!([2]));
}

#[test]
fn inspect_lists_columns_and_version() {
    let dir = tmp_dir("inspect");
    fixture(&dir);
    let v = stdout_json(&run(&["inspect", "--input", dir.join("weights.parquet").to_str().unwrap()]));
    assert_eq!(v["entries"], 2);
    assert_eq!(v["schema_version"], 29);
    let names: Vec<&str> = v["columns"].as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["dsid", "totalEventsWeighted"]);
}

#[test]
fn index_random_run_number_changes_pairing() {
    let dir = tmp_dir("random_run");
    let keyed = |name: &str, random: Vec<u32>| {
        MemorySource::builder(name, SchemaVersion(29))
            .column("eventNumber", vec![5u64, 6, 7])
            .column("runNumber", vec![1u32, 1, 1])
            .column("randomRunNumber", random)
            .build()
            .unwrap()
    };
    let reco = write(&dir, "reco.parquet", keyed("reco", vec![300_000, 300_001, 300_002]));
    let particle = write(&dir, "particle.parquet", keyed("particle", vec![300_000, 310_000, 300_002]));
    let (reco, particle) = (reco.to_str().unwrap(), particle.to_str().unwrap());

    let plain = stdout_json(&run(&["index", "--reco", reco, "--particle", particle]));
    assert_eq!(plain["summary"]["paired"], 3);

    let random = stdout_json(&run(&["index", "--reco", reco, "--particle", particle, "--random-run-number", "--full"]));
    assert_eq!(random["summary"]["paired"], 2);
    assert_eq!(random["paired"], serde_json::json!([[0, 0], [2, 2]]));
    assert_eq!(random["reco_only"], serde_json::json!([1]));
    assert_eq!(random["particle_only"], serde_json::json!([1]));
}
