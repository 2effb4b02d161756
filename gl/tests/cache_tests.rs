//! Pipeline cache key, blob cache and disk cache behavior across backend
//! instances.
//!
//! Run with: `cargo test -p redlilium-gl --test cache_tests`

mod common;

use rstest::rstest;

use common::{Profile, TestContext, tinted_pipeline_descriptor, tinted_pipeline_descriptor_at};
use redlilium_gl::RhiParameters;
use redlilium_gl::driver::DummyCall;
use redlilium_gl::pipeline::ProgramSource;

// ============================================================================
// Cache keys
// ============================================================================

#[rstest]
#[case::gl46(Profile::DesktopGl46)]
#[case::gles30(Profile::Gles30)]
#[case::gles20(Profile::Gles20)]
fn test_cache_key_is_stable_across_instances(#[case] profile: Profile) {
    let mut first = TestContext::new(profile);
    let mut second = TestContext::new(profile);

    let a = first.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let b = second.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    assert_eq!(a.cache_key(), b.cache_key());

    let moved = first
        .rhi
        .create_graphics_pipeline(&tinted_pipeline_descriptor_at(3))
        .unwrap();
    assert_ne!(a.cache_key(), moved.cache_key());
}

// ============================================================================
// Blob cache
// ============================================================================

#[test]
fn test_exported_blob_skips_linking_in_new_instance() {
    let params = RhiParameters::new().with_pipeline_cache_save(true);
    let mut producer = TestContext::with_parameters(Profile::DesktopGl46, params.clone());
    producer.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let data = producer.rhi.pipeline_cache_data();
    assert!(!data.is_empty());

    let mut consumer = TestContext::with_parameters(Profile::DesktopGl46, params);
    assert_eq!(consumer.rhi.set_pipeline_cache_data(&data), 1);
    consumer.driver.clear_calls();

    let pipeline = consumer.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    assert_eq!(pipeline.program_source(), ProgramSource::BlobCache);
    assert_eq!(
        consumer.driver.count_calls(|c| matches!(c, DummyCall::LinkProgram(_))),
        0
    );
    assert_eq!(
        consumer.driver.count_calls(|c| matches!(c, DummyCall::CompileShader(_))),
        0
    );
}

#[test]
fn test_failed_binary_load_falls_back_to_source() {
    let params = RhiParameters::new().with_pipeline_cache_save(true);
    let mut producer = TestContext::with_parameters(Profile::DesktopGl46, params.clone());
    producer.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let data = producer.rhi.pipeline_cache_data();

    let mut consumer = TestContext::with_parameters(Profile::DesktopGl46, params);
    assert_eq!(consumer.rhi.set_pipeline_cache_data(&data), 1);
    consumer.driver.fail_program_creations(1);
    consumer.driver.clear_calls();

    let pipeline = consumer.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    assert_eq!(pipeline.program_source(), ProgramSource::Compiled);
    assert_eq!(
        consumer.driver.count_calls(|c| matches!(c, DummyCall::LinkProgram(_))),
        1
    );
}

#[test]
fn test_blob_from_other_driver_is_rejected() {
    let params = RhiParameters::new().with_pipeline_cache_save(true);
    let mut producer = TestContext::with_parameters(Profile::DesktopGl46, params.clone());
    producer.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    let data = producer.rhi.pipeline_cache_data();

    let mut consumer = TestContext::with_parameters(Profile::Gles30, params);
    assert_eq!(consumer.rhi.set_pipeline_cache_data(&data), 0);
    assert_eq!(consumer.rhi.set_pipeline_cache_data(b"not a cache blob"), 0);

    let pipeline = consumer.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    assert_eq!(pipeline.program_source(), ProgramSource::Compiled);
}

// ============================================================================
// Disk cache
// ============================================================================

#[test]
fn test_disk_cache_is_shared_between_instances() {
    let dir = tempfile::tempdir().unwrap();
    let params = RhiParameters::new().with_disk_cache_dir(dir.path());

    let mut first = TestContext::with_parameters(Profile::DesktopGl46, params.clone());
    let compiled = first.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    assert_eq!(compiled.program_source(), ProgramSource::Compiled);

    let mut second = TestContext::with_parameters(Profile::DesktopGl46, params);
    let loaded = second.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
    assert_eq!(loaded.program_source(), ProgramSource::DiskCache);
    assert_eq!(compiled.cache_key(), loaded.cache_key());
}

#[test]
fn test_disk_cache_disabled_without_program_binaries() {
    let dir = tempfile::tempdir().unwrap();
    let params = RhiParameters::new().with_disk_cache_dir(dir.path());

    for _ in 0..2 {
        let mut ctx = TestContext::with_parameters(Profile::Gles20, params.clone());
        let pipeline = ctx.rhi.create_graphics_pipeline(&tinted_pipeline_descriptor()).unwrap();
        assert_eq!(pipeline.program_source(), ProgramSource::Compiled);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
