use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use dedupe_estimator::{estimate, estimate_with, DedupeResult, EstimateError, EstimateOptions};

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn small_chunks() -> EstimateOptions {
    EstimateOptions {
        target_chunk_size: 4096,
        ..Default::default()
    }
}

fn check_invariant(result: &DedupeResult) {
    assert!(result.compressed_chunk_bytes <= result.chunk_bytes);
    assert!(result.chunk_bytes <= result.total_len);
}

#[test]
fn empty_path_list_is_all_zeros() {
    let result = estimate::<&Path>(&[]).unwrap();
    assert_eq!(result, DedupeResult::default());
}

#[test]
fn empty_file_is_all_zeros() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty", &[]);

    let result = estimate(&[path]).unwrap();
    assert_eq!(result, DedupeResult::default());
}

#[test]
fn identical_files_collapse_to_one_copy() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(1, 256 * 1024);
    let a = write_file(&dir, "a", &data);
    let b = write_file(&dir, "b", &data);

    let result = estimate_with(&[a, b], &small_chunks()).unwrap().result;
    check_invariant(&result);
    assert_eq!(result.total_len, 2 * data.len());
    assert_eq!(result.chunk_bytes, data.len());
}

#[test]
fn shifted_content_still_dedupes() {
    // Content-defined boundaries resynchronize after an insertion, so a
    // prefixed copy shares almost all of its chunks with the original.
    let dir = TempDir::new().unwrap();
    let data = random_bytes(2, 256 * 1024);
    let mut shifted = random_bytes(3, 64);
    shifted.extend_from_slice(&data);

    let a = write_file(&dir, "a", &data);
    let b = write_file(&dir, "b", &shifted);

    let result = estimate_with(&[a, b], &small_chunks()).unwrap().result;
    check_invariant(&result);
    assert!(
        result.chunk_bytes < result.total_len * 7 / 10,
        "expected most chunks to dedup, got {} of {}",
        result.chunk_bytes,
        result.total_len
    );
}

#[test]
fn repetitive_content_compresses() {
    let dir = TempDir::new().unwrap();
    let data = b"all work and no play makes jack a dull boy. ".repeat(8 * 1024);
    let path = write_file(&dir, "repetitive", &data);

    let result = estimate_with(&[path], &small_chunks()).unwrap().result;
    check_invariant(&result);
    assert!(
        result.compressed_chunk_bytes * 4 < result.chunk_bytes,
        "expected strong compression, got {} of {}",
        result.compressed_chunk_bytes,
        result.chunk_bytes
    );
}

#[test]
fn incompressible_content_obeys_the_invariant() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "noise", &random_bytes(4, 256 * 1024));

    let result = estimate_with(&[path], &small_chunks()).unwrap().result;
    check_invariant(&result);
    assert_eq!(result.chunk_bytes, result.total_len);
}

#[test]
fn repeated_runs_are_deterministic() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a", &random_bytes(5, 128 * 1024));
    let b = write_file(&dir, "b", &random_bytes(6, 200 * 1024));
    let paths = [a, b];

    let first = estimate_with(&paths, &small_chunks()).unwrap().result;
    let second = estimate_with(&paths, &small_chunks()).unwrap().result;
    assert_eq!(first, second);
}

#[test]
fn total_len_counts_every_input_byte() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a", &random_bytes(7, 100_000));
    let b = write_file(&dir, "b", &random_bytes(8, 50_000));
    let c = write_file(&dir, "c", &[]);

    let result = estimate_with(&[a, b, c], &small_chunks()).unwrap().result;
    check_invariant(&result);
    assert_eq!(result.total_len, 150_000);
}

#[test]
fn missing_path_fails_and_names_the_file() {
    let dir = TempDir::new().unwrap();
    let present = write_file(&dir, "present", b"data");
    let missing = dir.path().join("missing");

    let err = estimate(&[present, missing.clone()]).unwrap_err();
    match err {
        EstimateError::Io { path, .. } => assert_eq!(path, missing),
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn invalid_chunk_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "a", b"data");

    let options = EstimateOptions {
        target_chunk_size: 1000,
        ..Default::default()
    };
    let err = estimate_with(&[path], &options).unwrap_err();
    assert!(matches!(err, EstimateError::InvalidChunkSize(1000)));
}

#[test]
fn per_source_stores_line_up_with_inputs() {
    let dir = TempDir::new().unwrap();
    let shared = random_bytes(9, 128 * 1024);
    let a = write_file(&dir, "a", &shared);
    let b = write_file(&dir, "b", &shared);

    let est = estimate_with(&[a, b], &small_chunks()).unwrap();
    assert_eq!(est.stores.len(), 2);
    assert_eq!(est.stores[0].total_len(), shared.len());
    assert_eq!(est.stores[1].total_len(), shared.len());

    // Every chunk of the second file was first seen in the first.
    let segments = est.source_segments();
    assert!(segments[1].iter().all(|&source| source == 0));
}

#[test]
fn dedupe_maps_render_from_an_estimate() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a", &random_bytes(10, 128 * 1024));
    let b = write_file(&dir, "b", &random_bytes(11, 128 * 1024));

    let est = estimate_with(&[a, b], &small_chunks()).unwrap();
    let map = dir.path().join("merged.png");
    dedupe_estimator::write_dedupe_map(&est.merged.segments(), &map).unwrap();

    let bytes = fs::read(&map).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}
