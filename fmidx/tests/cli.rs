use anyhow::Result;
use assert_cmd::Command;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::NamedTempFile;

const PRG: &str = "fmidx";
const SEQ1: &str = "../data/inputs/1.fa";
const SEQ2: &str = "../data/inputs/2.fa";
const SEQ3: &str = "../data/inputs/3.fa";
const SEQ4: &str = "../data/inputs/4.fa";

// --------------------------------------------------
fn create(input_file: &str, reverse: bool) -> Result<NamedTempFile> {
    let outfile = NamedTempFile::new()?;
    let outpath = outfile.path().to_string_lossy().to_string();
    let mut args = vec!["create", "-o", outpath.as_str(), "-q", "2", "-n", "2", input_file];
    if reverse {
        args.push("--reverse");
    }
    let output = Command::cargo_bin(PRG)?.args(&args).output().expect("fail");
    assert!(output.status.success());
    Ok(outfile)
}

// --------------------------------------------------
fn build_index(projects: &[&NamedTempFile], extra: &[&str]) -> Result<NamedTempFile> {
    let outfile = NamedTempFile::new()?;
    let outpath = outfile.path().to_string_lossy().to_string();
    let mut args = vec![
        "index".to_string(),
        "-o".to_string(),
        outpath,
        "-i".to_string(),
        "3".to_string(),
    ];
    args.extend(extra.iter().map(|v| v.to_string()));
    args.extend(
        projects
            .iter()
            .map(|p| p.path().to_string_lossy().to_string()),
    );
    let output = Command::cargo_bin(PRG)?.args(&args).output().expect("fail");
    assert!(output.status.success());
    Ok(outfile)
}

// --------------------------------------------------
fn run(args: &[&str]) -> Result<String> {
    let output = Command::cargo_bin(PRG)?.args(args).output().expect("fail");
    assert!(output.status.success());
    Ok(String::from_utf8(output.stdout)?)
}

// --------------------------------------------------
fn path(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().to_string()
}

// --------------------------------------------------
#[test]
fn test_no_args() -> Result<()> {
    let output = Command::cargo_bin(PRG)?.output().expect("fail");
    assert!(!output.status.success());
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_create_bad_input() -> Result<()> {
    let output = Command::cargo_bin(PRG)?
        .args(["create", "../data/inputs/missing.fa"])
        .output()
        .expect("fail");
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.starts_with("Error:"));
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_count() -> Result<()> {
    let project = create(SEQ1, false)?;
    let index = build_index(&[&project], &[])?;
    let out = run(&["count", &path(&index), "ACGT", "GTN", "TTT"])?;
    assert_eq!(out, "ACGT 3\nGTN 0\nTTT 0\n");

    // Queries from a file
    let queries = NamedTempFile::new()?;
    fs::write(queries.path(), "ACG\nCGTA\n")?;
    let out = run(&["count", &path(&index), &path(&queries)])?;
    assert_eq!(out, "ACG 3\nCGTA 1\n");

    // Unknown characters are reported, not fatal
    let output = Command::cargo_bin(PRG)?
        .args(["count", &path(&index), "AXG", "ACG"])
        .output()
        .expect("fail");
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout)?, "ACG 3\n");
    assert!(!output.stderr.is_empty());
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_locate() -> Result<()> {
    let project = create(SEQ1, false)?;
    let index = build_index(&[&project], &[])?;
    let out = run(&["locate", &path(&index), "ACG"])?;
    assert_eq!(out, "ACG\n1 0,4,9\n//\n");

    let out = run(&["locate", "--abs", &path(&index), "ACG"])?;
    assert_eq!(out, "ACG 0 4 9\n");

    let project = create(SEQ2, true)?;
    let index = build_index(&[&project], &[])?;
    let out = run(&["locate", &path(&index), "CGTA"])?;
    assert_eq!(out, "CGTA\nABC 1\nDEF 1\n//\n");
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_locate_without_samples() -> Result<()> {
    let project = create(SEQ1, false)?;
    let index = build_index(&[&project], &["--no-locate"])?;
    let output = Command::cargo_bin(PRG)?
        .args(["locate", &path(&index), "ACG"])
        .output()
        .expect("fail");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("without locate support"));

    // Counting still works
    let out = run(&["count", &path(&index), "ACG"])?;
    assert_eq!(out, "ACG 3\n");
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_mstats() -> Result<()> {
    let project = create(SEQ1, true)?;
    let index = build_index(&[&project], &[])?;
    let out = run(&["mstats", &path(&index), "ACGTT"])?;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], "ACGTT");
    let columns: Vec<Vec<&str>> = lines[1..6]
        .iter()
        .map(|line| line.split('\t').collect())
        .collect();
    let lengths: Vec<&str> = columns.iter().map(|c| c[1]).collect();
    assert_eq!(lengths, ["4", "3", "2", "1", "1"]);
    assert!(columns.iter().all(|c| c[2].starts_with("1:")));
    assert_eq!(lines[6], "//");

    // Forward indexes are refused
    let project = create(SEQ1, false)?;
    let index = build_index(&[&project], &[])?;
    let output = Command::cargo_bin(PRG)?
        .args(["mstats", &path(&index), "ACGTT"])
        .output()
        .expect("fail");
    assert!(!output.status.success());
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_verify() -> Result<()> {
    for reverse in [false, true] {
        let project = create(SEQ3, reverse)?;
        let index = build_index(&[&project], &["-b", "2", "-s", "4"])?;
        let out = run(&["verify", &path(&index), &path(&project)])?;
        assert!(out.starts_with("Verified 64 rows against"));
    }

    // Index of another sequence
    let project1 = create(SEQ1, false)?;
    let project3 = create(SEQ3, false)?;
    let index = build_index(&[&project1], &[])?;
    let output = Command::cargo_bin(PRG)?
        .args(["verify", &path(&index), &path(&project3)])
        .output()
        .expect("fail");
    assert!(!output.status.success());
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_merge() -> Result<()> {
    let project1 = create(SEQ1, false)?;
    let project3 = create(SEQ3, false)?;
    let index = build_index(&[&project1, &project3], &[])?;
    let out = run(&["count", &path(&index), "ACGT", "GATTACA", "TTTT"])?;
    assert_eq!(out, "ACGT 3\nGATTACA 3\nTTTT 7\n");

    let out = run(&["locate", &path(&index), "GATTACA"])?;
    assert_eq!(out, "GATTACA\nchr1 0,7,18\n//\n");
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_summarize() -> Result<()> {
    let project = create(SEQ1, false)?;
    let index = build_index(&[&project], &[])?;
    let out = run(&["summarize", &path(&index)])?;
    let rows: Vec<(String, String)> = out
        .lines()
        .filter_map(|line| {
            line.split_once("  ")
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect();
    let get = |key: &str| {
        rows.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(get("Text Length"), Some("13".to_string()));
    assert_eq!(get("Num Rows"), Some("14".to_string()));
    assert_eq!(get("Alphabet Size"), Some("4".to_string()));
    assert_eq!(get("Special Characters"), Some("1".to_string()));
    assert_eq!(get("Read Mode"), Some("forward".to_string()));
    assert_eq!(get("Locate Interval"), Some("3".to_string()));
    assert_eq!(get("Headers"), Some("1".to_string()));
    Ok(())
}

// --------------------------------------------------
#[test]
fn test_all_wildcards() -> Result<()> {
    let project = create(SEQ4, false)?;
    let index = build_index(&[&project], &[])?;
    let out = run(&["count", &path(&index), "A", "NN"])?;
    assert_eq!(out, "A 0\nNN 0\n");
    let out = run(&["verify", &path(&index), &path(&project)])?;
    assert!(out.starts_with("Verified 6 rows against"));
    Ok(())
}
