//! Behaviour-driven tests for consumer-side placement.
//!
//! Each scenario starts from a package assembled by the real pipeline and
//! places from it the way a consumer's build does.

mod support;

use archpack::descriptor::ArchitectureDescriptor;
use archpack::manifest::{self, MANIFEST_FILE, PackageManifest};
use archpack::matrix::BuildMatrix;
use archpack::placement::{
    ConsumerContext, Package, PlacementError, PlacementOutcome, PlacementResult,
    resolve_and_place,
};
use archpack::resolver::ResolveError;
use archpack::test_utils::fake_binary;
use archpack::transport;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::fs;
use std::path::PathBuf;
use support::{FILE_NAME, build_package};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct PlacementWorld {
    temp_dir: TempDir,
    package: Option<Package>,
    placements: Vec<PlacementResult>,
    error: Option<PlacementError>,
}

#[fixture]
fn world() -> PlacementWorld {
    PlacementWorld {
        temp_dir: TempDir::new().expect("temp dir"),
        package: None,
        placements: Vec::new(),
        error: None,
    }
}

fn output_dir(world: &PlacementWorld) -> PathBuf {
    world.temp_dir.path().join("consumer/bin")
}

fn package(world: &PlacementWorld) -> &Package {
    world.package.as_ref().expect("package set")
}

fn output_names(world: &PlacementWorld) -> Vec<String> {
    let Ok(entries) = fs::read_dir(output_dir(world)) else {
        return Vec::new();
    };
    entries
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a packaged release of sqlite3 \"{version}\"")]
fn given_package(world: &mut PlacementWorld, version: String) {
    let staged = build_package(
        world.temp_dir.path(),
        "sqlite3",
        &version,
        BuildMatrix::required(),
    );
    world.package = Some(Package::open(staged.root).expect("open package"));
}

#[given("the package manifest omits \"{descriptor}\"")]
fn given_manifest_omits(world: &mut PlacementWorld, descriptor: String) {
    let omitted: ArchitectureDescriptor = descriptor.parse().expect("valid descriptor");
    let current = package(world);
    let trimmed = PackageManifest::new(
        current.manifest().library().clone(),
        current.manifest().version().clone(),
        current
            .manifest()
            .entries()
            .filter(|entry| entry.descriptor() != omitted)
            .cloned(),
    )
    .expect("valid manifest");
    let root = current.root().to_path_buf();
    fs::write(
        root.join(MANIFEST_FILE),
        manifest::to_json(&trimmed).expect("json"),
    )
    .expect("rewrite manifest");
    world.package = Some(Package::open(root).expect("reopen package"));
}

#[given("the \"{descriptor}\" binary in the package is tampered with")]
fn given_tampered(world: &mut PlacementWorld, descriptor: String) {
    let descriptor: ArchitectureDescriptor = descriptor.parse().expect("valid descriptor");
    let current = package(world);
    let entry = current.manifest().entry(descriptor).expect("entry present");
    fs::write(entry.resolve_in(current.root()), b"not the released binary").expect("tamper");
}

#[given("the package is transported as an archive")]
fn given_transported(world: &mut PlacementWorld) {
    let archive = world.temp_dir.path().join("transfer/sqlite3.tar.zst");
    fs::create_dir_all(archive.parent().expect("parent")).expect("mkdir");
    transport::create_archive(package(world).root(), &archive).expect("archive");
    let unpacked = world.temp_dir.path().join("unpacked");
    world.package = Some(Package::unpack(&archive, &unpacked).expect("unpack"));
}

#[when("a \"{descriptor}\" consumer places the binary")]
fn when_consumer_places(world: &mut PlacementWorld, descriptor: String) {
    let context = ConsumerContext {
        target: descriptor.parse().expect("valid descriptor"),
        output_dir: output_dir(world),
    };
    match resolve_and_place(package(world), &context) {
        Ok(result) => world.placements.push(result),
        Err(err) => world.error = Some(err),
    }
}

#[then("the placed binary is the \"{descriptor}\" build")]
fn then_placed_build(world: &mut PlacementWorld, descriptor: String) {
    let expected: ArchitectureDescriptor = descriptor.parse().expect("valid descriptor");
    let placed = world.placements.last().expect("a placement");
    assert_eq!(placed.resolved, expected);
    assert_eq!(placed.path, output_dir(world).join(FILE_NAME));
    assert_eq!(fs::read(&placed.path).expect("read"), fake_binary(expected, 0));
}

#[then("the output directory holds only the binary")]
fn then_only_binary(world: &mut PlacementWorld) {
    assert_eq!(output_names(world), [FILE_NAME]);
}

#[then("the output directory is empty")]
fn then_output_empty(world: &mut PlacementWorld) {
    assert!(output_names(world).is_empty());
}

#[then("the last placement left the output unchanged")]
fn then_unchanged(world: &mut PlacementWorld) {
    let outcomes: Vec<_> = world.placements.iter().map(|placed| placed.outcome).collect();
    assert_eq!(
        outcomes,
        [PlacementOutcome::Placed, PlacementOutcome::Unchanged]
    );
}

#[then("the placement is marked as a release fallback")]
fn then_fallback(world: &mut PlacementWorld) {
    let placed = world.placements.last().expect("a placement");
    assert!(placed.fell_back_to_release);
}

#[then("placement fails listing {count} available descriptors")]
fn then_unsupported(world: &mut PlacementWorld, count: usize) {
    let err = world.error.as_ref().expect("placement error");
    let PlacementError::Resolve(ResolveError::UnsupportedArchitecture { available, .. }) = err
    else {
        panic!("expected unsupported architecture, got {err:?}");
    };
    assert_eq!(available.len(), count);
}

#[then("placement fails with an integrity mismatch")]
fn then_integrity(world: &mut PlacementWorld) {
    let err = world.error.as_ref().expect("placement error");
    assert!(
        matches!(err, PlacementError::IntegrityMismatch { .. }),
        "expected integrity mismatch, got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/placement.feature",
    name = "A consumer receives the binary for its exact descriptor"
)]
fn scenario_exact_match(world: PlacementWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/placement.feature",
    name = "Placing twice writes nothing the second time"
)]
fn scenario_idempotent(world: PlacementWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/placement.feature",
    name = "A debug consumer falls back to the release build"
)]
fn scenario_debug_fallback(world: PlacementWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/placement.feature",
    name = "A missing architecture aborts the consumer build"
)]
fn scenario_missing_architecture(world: PlacementWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/placement.feature",
    name = "A tampered package binary is rejected"
)]
fn scenario_tampered(world: PlacementWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/placement.feature",
    name = "A transported archive places like the staged directory"
)]
fn scenario_transported(world: PlacementWorld) {
    let _ = world;
}
