//! Integration tests for PipelineRunner over a scripted API.

mod common;

use assetflow_client::TaskStatus;
use assetflow_pipeline::{LookupTable, PipelineError, RunOptions};
use common::{Call, MockApi, asset_dir, bundle, read_manifest, runner};
use serde_json::{Value, json};

fn preview_task() -> Value {
    json!({
        "id": "preview",
        "inputs": [
            {"name": "prompt", "source": "literal", "value": "barrel {{seed}}"}
        ],
        "outputs": [
            {"name": "modelUrl", "responsePath": "model_urls.glb", "artifact": "preview.glb"}
        ]
    })
}

fn refine_task() -> Value {
    json!({
        "id": "refine",
        "inputs": [
            {"name": "preview_task_id", "source": "step", "step": "preview", "path": "taskId"}
        ],
        "outputs": [
            {"name": "modelUrl", "responsePath": "model_urls.glb"}
        ]
    })
}

fn prop_pipeline() -> Value {
    json!({
        "name": "prop",
        "steps": [
            {"id": "preview", "task": "preview"},
            {"id": "refine", "task": "refine", "dependsOn": ["preview"]}
        ]
    })
}

fn script_prop(api: &MockApi) {
    api.succeed(
        "/v1/preview",
        json!({"model_urls": {"glb": "https://cdn/preview.glb"}}),
    );
    api.succeed(
        "/v1/refine",
        json!({"model_urls": {"glb": "https://cdn/refined.glb"}}),
    );
}

#[tokio::test]
async fn test_two_step_run_then_idempotent_rerun() {
    let api = MockApi::new();
    script_prop(&api);
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(bundle(&[preview_task(), refine_task()], &[prop_pipeline()]), &api);
    let options = RunOptions::new("prop", dir.path());

    let first = runner.run(&options).await.unwrap();

    let preview = &first.tasks["preview"];
    assert_eq!(preview.status, Some(TaskStatus::Succeeded));
    assert_eq!(preview.task_id.as_deref(), Some("task-1"));
    assert_eq!(preview.outputs["modelUrl"], "https://cdn/preview.glb");
    assert_eq!(preview.artifacts["modelUrl"], "preview.glb");
    assert!(dir.path().join("preview.glb").is_file());

    let posts = api.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1], ("/v1/refine".to_string(), json!({"preview_task_id": "task-1"})));
    assert_eq!(read_manifest(dir.path()), first);

    let calls_before = api.call_count();
    let second = runner.run(&options).await.unwrap();
    assert_eq!(api.call_count(), calls_before);
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_flat_record_falls_back_to_task_fetch() {
    let api = MockApi::new();
    script_prop(&api);
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(bundle(&[preview_task()], &[json!({
        "name": "prop",
        "steps": [{"id": "preview", "task": "preview"}]
    })]), &api);

    runner.run(&RunOptions::new("prop", dir.path())).await.unwrap();

    let calls = api.calls();
    assert_eq!(calls[1], Call::Stream("/v1/preview/task-1/stream".to_string()));
    assert_eq!(calls[2], Call::Get("/v1/preview/task-1".to_string()));
    assert_eq!(api.downloads(), vec!["https://cdn/preview.glb".to_string()]);
}

#[tokio::test]
async fn test_fetch_with_nested_result() {
    let api = MockApi::new();
    api.finish("/v1/rigging", json!({"status": "SUCCEEDED"}));
    api.set_get(
        "/v1/rigging/task-1",
        json!({"id": "task-1", "status": "SUCCEEDED", "result": {"rigged_character_glb_url": "https://cdn/rig.glb"}}),
    );
    let dir = asset_dir(json!({"id": "knight"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "rigging",
                "outputs": [{"name": "rigUrl", "responsePath": "rigged_character_glb_url"}]
            })],
            &[json!({"name": "rig", "steps": [{"id": "rig", "task": "rigging"}]})],
        ),
        &api,
    );

    let manifest = runner.run(&RunOptions::new("rig", dir.path())).await.unwrap();
    let outputs = &manifest.tasks["rigging"].outputs;
    assert_eq!(outputs["rigUrl"], "https://cdn/rig.glb");
    assert_eq!(outputs["taskId"], "task-1");
}

#[tokio::test]
async fn test_resume_after_failure_reruns_only_remaining_steps() {
    let api = MockApi::new();
    api.succeed("/v1/a", json!({}));
    api.succeed("/v1/b", json!({}));
    api.finish(
        "/v1/c",
        json!({"status": "FAILED", "task_error": {"message": "boom"}}),
    );
    api.succeed("/v1/c", json!({}));

    let dir = asset_dir(json!({"id": "crate"}));
    let runner = runner(
        bundle(
            &[json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})],
            &[json!({
                "name": "chain",
                "steps": [
                    {"id": "a", "task": "a"},
                    {"id": "b", "task": "b", "dependsOn": ["a"]},
                    {"id": "c", "task": "c", "dependsOn": ["b"]}
                ]
            })],
        ),
        &api,
    );
    let options = RunOptions::new("chain", dir.path());

    let err = runner.run(&options).await.unwrap_err();
    assert!(!err.is_configuration_error());
    match err {
        PipelineError::TaskFailed {
            task,
            task_id,
            status,
            message,
        } => {
            assert_eq!(task, "c");
            assert_eq!(task_id, "task-3");
            assert_eq!(status, TaskStatus::Failed);
            assert_eq!(message, "boom");
        }
        other => panic!("expected TaskFailed, got {:?}", other),
    }

    let on_disk = read_manifest(dir.path());
    assert!(on_disk.tasks.contains_key("a"));
    assert!(on_disk.tasks.contains_key("b"));
    assert!(!on_disk.tasks.contains_key("c"));

    let posts_before = api.posts().len();
    let manifest = runner.run(&options).await.unwrap();
    let new_posts: Vec<String> = api.posts()[posts_before..]
        .iter()
        .map(|(path, _)| path.clone())
        .collect();
    assert_eq!(new_posts, vec!["/v1/c".to_string()]);
    assert_eq!(manifest.tasks["c"].status, Some(TaskStatus::Succeeded));
    assert_eq!(manifest.tasks["a"], on_disk.tasks["a"]);
}

#[tokio::test]
async fn test_canceled_task_fails_run() {
    let api = MockApi::new();
    api.finish("/v1/a", json!({"status": "CANCELED", "result": {}}));
    let dir = asset_dir(json!({"id": "x"}));
    let runner = runner(
        bundle(
            &[json!({"id": "a"})],
            &[json!({"name": "p", "steps": [{"id": "a", "task": "a"}]})],
        ),
        &api,
    );

    let err = runner.run(&RunOptions::new("p", dir.path())).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::TaskFailed {
            status: TaskStatus::Canceled,
            ..
        }
    ));
    assert!(err.to_string().contains("no error message"));
}

#[tokio::test]
async fn test_unmet_dependency_fails_before_any_call() {
    let api = MockApi::new();
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(bundle(&[preview_task(), refine_task()], &[prop_pipeline()]), &api);

    let err = runner
        .run(&RunOptions::new("prop", dir.path()).with_step("refine"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DependencyNotMet { ref step, ref dependency }
            if step == "refine" && dependency == "preview"
    ));
    assert!(err.is_configuration_error());
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_undeclared_dependency_fails_before_any_call() {
    let api = MockApi::new();
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[preview_task(), refine_task()],
            &[json!({
                "name": "prop",
                "steps": [
                    {"id": "preview", "task": "preview"},
                    {"id": "refine", "task": "refine", "dependsOn": ["missing"]}
                ]
            })],
        ),
        &api,
    );

    let err = runner.run(&RunOptions::new("prop", dir.path())).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidDefinition(ref m) if m.contains("'missing'")));
    assert_eq!(api.call_count(), 0);
    assert!(read_manifest(dir.path()).tasks.is_empty());
}

#[tokio::test]
async fn test_configuration_errors() {
    let api = MockApi::new();
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[preview_task()],
            &[
                prop_pipeline(),
                json!({"name": "solo", "steps": [{"id": "preview", "task": "preview"}]}),
            ],
        ),
        &api,
    );

    // refine task is not loaded
    let err = runner.run(&RunOptions::new("prop", dir.path())).await.unwrap_err();
    assert!(matches!(err, PipelineError::TaskNotFound(ref t) if t == "refine"));

    let err = runner.run(&RunOptions::new("vehicle", dir.path())).await.unwrap_err();
    assert!(matches!(err, PipelineError::PipelineNotFound(_)));

    let err = runner
        .run(&RunOptions::new("solo", dir.path()).with_step("texture"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::StepNotFound { ref step, .. } if step == "texture"));

    let empty = tempfile::TempDir::new().unwrap();
    let err = runner.run(&RunOptions::new("solo", empty.path())).await.unwrap_err();
    assert!(matches!(err, PipelineError::ManifestNotFound(_)));

    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_step_binding_overrides_task_binding() {
    let api = MockApi::new();
    let dir = asset_dir(json!({"id": "barrel", "prompt": "from manifest"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "preview",
                "inputs": [
                    {"name": "prompt", "source": "manifest", "path": "prompt"},
                    {"name": "art_style", "source": "env", "path": "ART_STYLE", "default": "realistic"},
                    {"name": "negative_prompt", "source": "literal", "value": ""}
                ]
            })],
            &[json!({
                "name": "p",
                "steps": [{
                    "id": "preview",
                    "task": "preview",
                    "inputs": [{"name": "prompt", "source": "literal", "value": "override {{assetId}}"}]
                }]
            })],
        ),
        &api,
    );

    runner.run(&RunOptions::new("p", dir.path())).await.unwrap();

    let (_, body) = &api.posts()[0];
    assert_eq!(
        body,
        &json!({"prompt": "override barrel", "art_style": "realistic"})
    );
}

#[tokio::test]
async fn test_seed_is_generated_once_and_reused() {
    let api = MockApi::new();
    api.succeed("/v1/preview", json!({}));
    let dir = asset_dir(json!({"id": "barrel"}));
    let pipeline = json!({"name": "p", "steps": [{"id": "preview", "task": "preview"}]});
    let runner = runner(bundle(&[preview_task()], &[pipeline]), &api);

    let manifest = runner.run(&RunOptions::new("p", dir.path())).await.unwrap();
    let seed = manifest.seed.unwrap();
    assert_eq!(read_manifest(dir.path()).seed, Some(seed));
    assert_eq!(api.posts()[0].1["prompt"], format!("barrel {}", seed));
}

#[tokio::test]
async fn test_existing_seed_drives_templates() {
    let api = MockApi::new();
    api.succeed("/v1/preview", json!({}));
    let dir = asset_dir(json!({"id": "barrel", "seed": 42}));
    let pipeline = json!({"name": "p", "steps": [{"id": "preview", "task": "preview"}]});
    let runner = runner(bundle(&[preview_task()], &[pipeline]), &api);

    let manifest = runner.run(&RunOptions::new("p", dir.path())).await.unwrap();
    assert_eq!(manifest.seed, Some(42));
    assert_eq!(api.posts()[0].1["prompt"], "barrel 42");
}

#[tokio::test]
async fn test_seed_persisted_even_when_run_fails() {
    let api = MockApi::new();
    api.finish("/v1/preview", json!({"status": "FAILED", "result": {}}));
    let dir = asset_dir(json!({"id": "barrel"}));
    let pipeline = json!({"name": "p", "steps": [{"id": "preview", "task": "preview"}]});
    let runner = runner(bundle(&[preview_task()], &[pipeline]), &api);

    assert!(runner.run(&RunOptions::new("p", dir.path())).await.is_err());
    assert!(read_manifest(dir.path()).seed.is_some());
}

#[tokio::test]
async fn test_lookup_fan_out_maps_last_iteration() {
    let api = MockApi::new();
    for n in 1..=3 {
        api.finish(
            "/v1/animations",
            json!({"status": "SUCCEEDED", "result": {"animation_glb_url": format!("https://cdn/anim-{}.glb", n)}}),
        );
    }
    let mut table = LookupTable::new();
    table.insert("Walk".into(), json!(30));
    table.insert("Run".into(), json!(14));
    table.insert("Idle".into(), json!(0));

    let dir = asset_dir(json!({"id": "knight"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "animations",
                "inputs": [{"name": "action_id", "source": "literal", "value": "{{anim}}"}],
                "outputs": [
                    {"name": "animUrl", "responsePath": "animation_glb_url", "artifact": "anim_{{anim_index}}.glb"}
                ]
            })],
            &[json!({
                "name": "character",
                "stateMapping": {"animations.latest": "animUrl"},
                "steps": [{
                    "id": "animate",
                    "task": "animations",
                    "forEach": {"source": "lookup", "table": "ANIMATION_IDS", "as": "anim"}
                }]
            })],
        ),
        &api,
    )
    .with_lookup("ANIMATION_IDS", table);

    let manifest = runner
        .run(&RunOptions::new("character", dir.path()))
        .await
        .unwrap();

    let action_ids: Vec<Value> = api
        .posts()
        .into_iter()
        .map(|(_, body)| body["action_id"].clone())
        .collect();
    assert_eq!(action_ids, vec![json!("30"), json!("14"), json!("0")]);

    assert_eq!(manifest.extra["animations"]["latest"], "https://cdn/anim-3.glb");
    for index in 0..3 {
        assert!(dir.path().join(format!("anim_{}.glb", index)).is_file());
    }
    assert_eq!(manifest.tasks["animations"].task_id.as_deref(), Some("task-3"));
}

#[tokio::test]
async fn test_fan_out_rerun_restores_earlier_iteration_artifact() {
    let api = MockApi::new();
    for n in 1..=3 {
        api.succeed(
            "/v1/animations",
            json!({"animation_glb_url": format!("https://cdn/anim-{}.glb", n)}),
        );
    }
    let mut table = LookupTable::new();
    table.insert("Walk".into(), json!(30));
    table.insert("Run".into(), json!(14));
    table.insert("Idle".into(), json!(0));

    let dir = asset_dir(json!({"id": "knight"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "animations",
                "inputs": [{"name": "action_id", "source": "literal", "value": "{{anim}}"}],
                "outputs": [
                    {"name": "animUrl", "responsePath": "animation_glb_url", "artifact": "anim_{{anim_index}}.glb"}
                ]
            })],
            &[json!({
                "name": "character",
                "steps": [{
                    "id": "animate",
                    "task": "animations",
                    "forEach": {"source": "lookup", "table": "ANIMATION_IDS", "as": "anim"}
                }]
            })],
        ),
        &api,
    )
    .with_lookup("ANIMATION_IDS", table);
    let options = RunOptions::new("character", dir.path());

    let first = runner.run(&options).await.unwrap();
    assert_eq!(first.tasks["animations"].artifacts["animUrl"], "anim_2.glb");

    std::fs::remove_file(dir.path().join("anim_0.glb")).unwrap();
    let calls_before = api.call_count();
    let second = runner.run(&options).await.unwrap();

    assert_eq!(
        api.calls()[calls_before..].to_vec(),
        vec![
            Call::Get("/v1/animations/task-3".to_string()),
            Call::Download(
                "https://cdn/anim-3.glb".to_string(),
                dir.path().join("anim_0.glb")
            ),
        ]
    );
    assert!(dir.path().join("anim_0.glb").is_file());
    assert_eq!(api.posts().len(), 3);
    assert_eq!(second.tasks, first.tasks);
}

#[tokio::test]
async fn test_for_each_requires_array() {
    let api = MockApi::new();
    let dir = asset_dir(json!({"id": "knight", "style": "toon"}));
    let runner = runner(
        bundle(
            &[json!({"id": "animations"})],
            &[json!({
                "name": "character",
                "steps": [{
                    "id": "animate",
                    "task": "animations",
                    "forEach": {"source": "manifest", "path": "style", "as": "anim"}
                }]
            })],
        ),
        &api,
    );

    let err = runner
        .run(&RunOptions::new("character", dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ForEachNotArray(ref s) if s == "animate"));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_step_state_mapping_overrides_pipeline_mapping() {
    let api = MockApi::new();
    api.succeed(
        "/v1/preview",
        json!({"model_urls": {"glb": "https://cdn/p.glb"}, "thumbnail_url": "https://cdn/t.png"}),
    );
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "preview",
                "outputs": [
                    {"name": "modelUrl", "responsePath": "model_urls.glb"},
                    {"name": "thumb", "responsePath": "thumbnail_url"}
                ]
            })],
            &[json!({
                "name": "p",
                "stateMapping": {"model.url": "thumb", "model.task": "taskId"},
                "steps": [{"id": "preview", "task": "preview", "stateMapping": {"model.url": "modelUrl"}}]
            })],
        ),
        &api,
    );

    let manifest = runner.run(&RunOptions::new("p", dir.path())).await.unwrap();
    assert_eq!(
        manifest.extra["model"],
        json!({"url": "https://cdn/p.glb", "task": "task-1"})
    );
}

#[tokio::test]
async fn test_deleted_artifact_is_backfilled() {
    let api = MockApi::new();
    script_prop(&api);
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(bundle(&[preview_task(), refine_task()], &[prop_pipeline()]), &api);
    let options = RunOptions::new("prop", dir.path());

    let first = runner.run(&options).await.unwrap();
    std::fs::remove_file(dir.path().join("preview.glb")).unwrap();
    api.set_get(
        "/v1/preview/task-1",
        json!({"id": "task-1", "status": "SUCCEEDED", "model_urls": {"glb": "https://cdn/fresh.glb"}}),
    );

    let posts_before = api.posts().len();
    let calls_before = api.call_count();
    let second = runner.run(&options).await.unwrap();

    assert_eq!(api.posts().len(), posts_before);
    assert_eq!(
        api.calls()[calls_before..].to_vec(),
        vec![
            Call::Get("/v1/preview/task-1".to_string()),
            Call::Download(
                "https://cdn/fresh.glb".to_string(),
                dir.path().join("preview.glb")
            ),
        ]
    );
    assert!(dir.path().join("preview.glb").is_file());
    assert_eq!(second.tasks, first.tasks);
}

#[tokio::test]
async fn test_backfill_failure_is_not_fatal() {
    let api = MockApi::new();
    script_prop(&api);
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(bundle(&[preview_task(), refine_task()], &[prop_pipeline()]), &api);
    let options = RunOptions::new("prop", dir.path());

    runner.run(&options).await.unwrap();
    std::fs::remove_file(dir.path().join("preview.glb")).unwrap();
    api.fail_download("https://cdn/preview.glb");

    let manifest = runner.run(&options).await.unwrap();
    assert!(!dir.path().join("preview.glb").exists());
    assert_eq!(manifest.tasks["preview"].status, Some(TaskStatus::Succeeded));
}

#[tokio::test]
async fn test_download_failure_on_fresh_run_is_fatal() {
    let api = MockApi::new();
    script_prop(&api);
    api.fail_download("https://cdn/preview.glb");
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(bundle(&[preview_task(), refine_task()], &[prop_pipeline()]), &api);

    let err = runner.run(&RunOptions::new("prop", dir.path())).await.unwrap_err();
    assert!(err.as_api_error().is_some());
    assert!(read_manifest(dir.path()).tasks.is_empty());
}

#[tokio::test]
async fn test_skip_artifacts_never_downloads() {
    let api = MockApi::new();
    script_prop(&api);
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[preview_task()],
            &[json!({"name": "p", "steps": [{"id": "preview", "task": "preview", "skipArtifacts": true}]})],
        ),
        &api,
    );
    let options = RunOptions::new("p", dir.path());

    let manifest = runner.run(&options).await.unwrap();
    assert!(api.downloads().is_empty());
    assert!(manifest.tasks["preview"].artifacts.is_empty());
    assert_eq!(manifest.tasks["preview"].outputs["modelUrl"], "https://cdn/preview.glb");

    // No backfill either: the rerun makes no calls at all.
    let calls_before = api.call_count();
    runner.run(&options).await.unwrap();
    assert_eq!(api.call_count(), calls_before);
}

#[tokio::test]
async fn test_array_artifacts_and_partial_backfill() {
    let api = MockApi::new();
    api.succeed(
        "/v1/texture",
        json!({"texture_urls": ["https://cdn/t0.png", "https://cdn/t1.png"]}),
    );
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "texture",
                "outputs": [{"name": "textures", "responsePath": "texture_urls", "artifact": "tex_{{index}}.png"}]
            })],
            &[json!({"name": "p", "steps": [{"id": "texture", "task": "texture"}]})],
        ),
        &api,
    );
    let options = RunOptions::new("p", dir.path());

    let manifest = runner.run(&options).await.unwrap();
    let artifacts = &manifest.tasks["texture"].artifacts;
    assert_eq!(artifacts["textures.0"], "tex_0.png");
    assert_eq!(artifacts["textures.1"], "tex_1.png");

    std::fs::remove_file(dir.path().join("tex_1.png")).unwrap();
    let downloads_before = api.downloads().len();
    runner.run(&options).await.unwrap();

    assert_eq!(
        api.downloads()[downloads_before..].to_vec(),
        vec!["https://cdn/t1.png".to_string()]
    );
    assert!(dir.path().join("tex_1.png").is_file());
}

#[tokio::test]
async fn test_poll_strategy() {
    let api = MockApi::new();
    api.succeed("/v1/remesh", json!({"result": {"model_urls": {"glb": "https://cdn/r.glb"}}}));
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[json!({
                "id": "remesh",
                "poll": {"strategy": "poll", "intervalMs": 10, "timeoutMs": 1000},
                "outputs": [{"name": "modelUrl", "responsePath": "model_urls.glb"}]
            })],
            &[json!({"name": "p", "steps": [{"id": "remesh", "task": "remesh"}]})],
        ),
        &api,
    );

    let manifest = runner.run(&RunOptions::new("p", dir.path())).await.unwrap();
    assert_eq!(
        api.calls()[1],
        Call::Poll("/v1/remesh/task-1".to_string())
    );
    assert!(api.calls().iter().all(|c| !matches!(c, Call::Stream(_))));
    assert_eq!(manifest.tasks["remesh"].outputs["modelUrl"], "https://cdn/r.glb");
}

#[tokio::test]
async fn test_non_post_task_is_rejected() {
    let api = MockApi::new();
    let dir = asset_dir(json!({"id": "barrel"}));
    let runner = runner(
        bundle(
            &[json!({"id": "balance", "method": "GET"})],
            &[json!({"name": "p", "steps": [{"id": "balance", "task": "balance"}]})],
        ),
        &api,
    );

    let err = runner.run(&RunOptions::new("p", dir.path())).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedMethod { ref method, .. } if method == "GET"));
    assert_eq!(api.call_count(), 0);
}
