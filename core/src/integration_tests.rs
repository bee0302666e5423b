//! End-to-end scenarios across registry, context and executor

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::capability::{Capability, FnCapability, Input, RetryPolicy, TypedCapability};
use crate::context::{ExecutionContext, MemoryStorage, Storage};
use crate::error::{CapabilityError, ExecError};
use crate::executor::{ExecutionRequest, Executor};
use crate::registry::{FactoryConfig, Registry};

fn input(pairs: &[(&str, Value)]) -> Input {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn sleeper(name: &str, ms: u64, priority: i32) -> FnCapability {
    FnCapability::new(name, "sleeps then echoes its input", move |_, input, _| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(input.get("input").cloned().unwrap_or(Value::Null))
        })
    })
    .with_priority(priority)
    .without_retry()
}

fn echo() -> FnCapability {
    FnCapability::new("echo", "Returns its input unchanged", |_, input, _| {
        Box::pin(async move { Ok(input.get("input").cloned().unwrap_or(Value::Null)) })
    })
}

#[tokio::test]
async fn test_serialized_by_single_slot() {
    let executor = Executor::with_max_concurrency(1);
    let cap: Arc<dyn Capability> = Arc::new(sleeper("slow", 100, 0));
    let requests = vec![
        ExecutionRequest::new(cap.clone(), input(&[("input", json!("a"))])),
        ExecutionRequest::new(cap, input(&[("input", json!("b"))])),
    ];

    let started = Instant::now();
    let results = executor
        .execute_batch(&CancellationToken::new(), requests)
        .await;
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(results.iter().all(|r| r.success));
}

#[tokio::test]
async fn test_batch_results_align_with_requests() {
    let executor = Executor::with_max_concurrency(2);
    // Later requests carry higher priority and finish sooner
    let requests: Vec<ExecutionRequest> = (0..6)
        .map(|i| {
            let cap: Arc<dyn Capability> = Arc::new(sleeper(
                &format!("cap-{}", i),
                60 - (i as u64) * 10,
                i,
            ));
            ExecutionRequest::new(cap, input(&[("input", json!(i))]))
        })
        .collect();

    let results = executor
        .execute_batch(&CancellationToken::new(), requests)
        .await;
    assert_eq!(results.len(), 6);
    for (i, result) in results.iter().enumerate() {
        assert!(result.success);
        assert_eq!(result.output, json!(i));
    }
}

#[tokio::test]
async fn test_batch_dispatches_by_priority() {
    let executor = Executor::with_max_concurrency(1);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let requests: Vec<ExecutionRequest> = [(0, "low"), (5, "high"), (0, "low-2"), (9, "urgent")]
        .into_iter()
        .map(|(priority, name)| {
            let order = order.clone();
            let cap = FnCapability::new(name, "records start order", move |_, _, _| {
                let order = order.clone();
                let name = name.to_string();
                Box::pin(async move {
                    order.lock().push(name);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(Value::Null)
                })
            })
            .with_priority(priority);
            ExecutionRequest::new(Arc::new(cap), input(&[("input", json!(""))]))
        })
        .collect();

    let results = executor
        .execute_batch(&CancellationToken::new(), requests)
        .await;
    assert!(results.iter().all(|r| r.success));
    // Soft preference: the most urgent request is admitted ahead of the low ones
    let order = order.lock();
    let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
    assert!(pos("urgent") < pos("low-2"));
    assert!(pos("high") < pos("low-2"));
}

#[tokio::test]
async fn test_backoff_spacing() {
    let stamps = Arc::new(parking_lot::Mutex::new(Vec::<Instant>::new()));
    let cap = {
        let stamps = stamps.clone();
        FnCapability::new("flaky", "fails until the third call", move |_, _, _| {
            let stamps = stamps.clone();
            Box::pin(async move {
                let mut stamps = stamps.lock();
                stamps.push(Instant::now());
                if stamps.len() < 3 {
                    Err(CapabilityError::new("503 service unavailable"))
                } else {
                    Ok(json!("ok"))
                }
            })
        })
        .with_retry(
            RetryPolicy::new(3)
                .with_backoff(Duration::from_millis(50), Duration::from_secs(1))
                .with_multiplier(2.0)
                .with_patterns(["503"]),
        )
    };

    let result = Executor::default()
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(Arc::new(cap), input(&[("input", json!("x"))])),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.attempts, 3);

    let stamps = stamps.lock();
    let first_gap = stamps[1] - stamps[0];
    let second_gap = stamps[2] - stamps[1];
    assert!(first_gap >= Duration::from_millis(50) && first_gap < Duration::from_millis(500));
    assert!(second_gap >= Duration::from_millis(100) && second_gap < Duration::from_millis(600));
}

#[tokio::test]
async fn test_peak_concurrency_across_callers() {
    let executor = Executor::with_max_concurrency(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let cap: Arc<dyn Capability> = {
        let (active, peak) = (active.clone(), peak.clone());
        Arc::new(FnCapability::new("counted", "tracks concurrency", move |_, _, _| {
            let (active, peak) = (active.clone(), peak.clone());
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
        }))
    };

    // Independent callers, not one batch
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let executor = executor.clone();
            let cap = cap.clone();
            tokio::spawn(async move {
                executor
                    .execute(
                        &CancellationToken::new(),
                        ExecutionRequest::new(cap, input(&[("input", json!(""))])),
                    )
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(executor.available_slots(), 2);
}

#[tokio::test]
async fn test_separate_executors_have_separate_pools() {
    let a = Executor::with_max_concurrency(1);
    let b = Executor::with_max_concurrency(1);
    let cap: Arc<dyn Capability> = Arc::new(sleeper("slow", 100, 0));

    let (cancel_a, cancel_b) = (CancellationToken::new(), CancellationToken::new());
    let started = Instant::now();
    let (ra, rb) = tokio::join!(
        a.execute(
            &cancel_a,
            ExecutionRequest::new(cap.clone(), input(&[("input", json!(1))]))
        ),
        b.execute(
            &cancel_b,
            ExecutionRequest::new(cap, input(&[("input", json!(2))]))
        ),
    );
    assert!(ra.success && rb.success);
    assert!(started.elapsed() < Duration::from_millis(190));
}

#[tokio::test]
async fn test_registry_find_then_execute() {
    let registry = Registry::new();
    registry.register_instance(Arc::new(echo()));

    let cap = registry.find("ECHO").unwrap();
    assert_eq!(cap.name(), "echo");

    let result = Executor::default()
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(cap.clone(), input(&[("input", json!("hi"))])),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.output, json!("hi"));

    // Missing the default `input` field
    let result = Executor::default()
        .execute(&CancellationToken::new(), ExecutionRequest::new(cap, Input::new()))
        .await;
    assert!(!result.success);
    assert!(result.never_ran());
    assert_eq!(result.error_message().unwrap(), "missing required field: input");
}

#[tokio::test]
async fn test_clock_lifecycle() {
    let registry = Registry::new();
    registry.register_instance(Arc::new(
        FnCapability::new("clock", "Returns the current UTC time", |_, _, _| {
            Box::pin(async { Ok(json!(chrono::Utc::now().to_rfc3339())) })
        })
        .with_schema(json!({"type": "object", "properties": {}})),
    ));

    let clock = registry.get("clock").unwrap();
    let result = Executor::default()
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(clock, Input::new()),
        )
        .await;
    assert!(result.success);
    assert!(chrono::DateTime::parse_from_rfc3339(result.output.as_str().unwrap()).is_ok());

    assert!(registry.remove("clock"));
    assert!(registry.get("clock").is_none());
}

#[tokio::test]
async fn test_factory_create_and_execute() {
    let registry = Registry::new();
    registry.register_factory("greeter", |config: &FactoryConfig| {
        let greeting = config
            .get("greeting")
            .and_then(Value::as_str)
            .ok_or_else(|| CapabilityError::new("greeting is required"))?
            .to_string();
        let cap = FnCapability::new("greeter", "greets", move |_, input, _| {
            let greeting = greeting.clone();
            Box::pin(async move {
                let who = input.get("input").and_then(Value::as_str).unwrap_or("world");
                Ok(json!(format!("{}, {}", greeting, who)))
            })
        });
        Ok(Arc::new(cap) as Arc<dyn Capability>)
    });

    let config: FactoryConfig = [("greeting".to_string(), json!("Hello"))].into_iter().collect();
    let cap = registry.create("greeter", &config).unwrap();
    let result = Executor::default()
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(cap, input(&[("input", json!("Ada"))])),
        )
        .await;
    assert_eq!(result.output, json!("Hello, Ada"));

    // Unconfigured factories are invisible to lookups
    assert!(registry.get("greeter").is_none());
    assert!(matches!(
        registry.create("missing", &config).err().unwrap(),
        ExecError::CapabilityNotFound { .. }
    ));
}

#[derive(Debug, Deserialize)]
struct AddArgs {
    a: i64,
    b: i64,
}

#[tokio::test]
async fn test_typed_capability_through_executor() {
    let calls = Arc::new(AtomicU32::new(0));
    let add = {
        let calls = calls.clone();
        TypedCapability::new(
            "add",
            "Adds two integers",
            json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"]
            }),
            move |_, args: AddArgs, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Ok(json!(args.a + args.b)) })
            },
        )
        .without_retry()
    };
    let add: Arc<dyn Capability> = Arc::new(add);
    let executor = Executor::default();

    let ok = executor
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(add.clone(), input(&[("a", json!(2)), ("b", json!(40))])),
        )
        .await;
    assert_eq!(ok.output, json!(42));

    let missing = executor
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(add.clone(), input(&[("a", json!(2))])),
        )
        .await;
    assert!(matches!(missing.error, Some(ExecError::Validation { ref field }) if field == "b"));

    // Present but the wrong type: validation passes, decoding fails
    let wrong = executor
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(add, input(&[("a", json!("two")), ("b", json!(1))])),
        )
        .await;
    assert_eq!(wrong.attempts, 1);
    assert!(wrong
        .error_message()
        .unwrap()
        .starts_with("failed to parse arguments for capability add"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_long_running_persists_continuation() {
    let storage = Arc::new(MemoryStorage::new());
    let job = FnCapability::new("export", "Starts an export job", |_, _, ctx| {
        Box::pin(async move {
            let token = format!("job-{}", ctx.execution_id);
            if let Some(storage) = ctx.storage() {
                storage.set("export/continuation", json!(token)).await?;
            }
            Ok(json!({ "continuation": token }))
        })
    })
    .with_long_running(true)
    .with_timeout(Duration::ZERO)
    .with_schema(json!({"type": "object", "properties": {}}));

    let ctx = Arc::new(
        ExecutionContext::new()
            .with_agent_id("agent-7")
            .with_storage(storage.clone()),
    );
    let result = Executor::default()
        .execute(
            &CancellationToken::new(),
            ExecutionRequest::new(Arc::new(job), Input::new()).with_context(ctx.clone()),
        )
        .await;

    assert!(result.success);
    assert!(result.long_running);
    let stored = storage.get("export/continuation").await.unwrap().unwrap();
    assert_eq!(stored, result.output["continuation"]);
    assert_eq!(stored, json!(format!("job-{}", ctx.execution_id)));
}

#[tokio::test]
async fn test_context_metadata_approval_in_batch() {
    let guarded: Arc<dyn Capability> = Arc::new(echo().with_approval(true));
    let approved = Arc::new(ExecutionContext::new().approved());
    let denied = Arc::new(ExecutionContext::new().with_metadata("approved", json!("yes")));

    let results = Executor::default()
        .execute_batch(
            &CancellationToken::new(),
            vec![
                ExecutionRequest::new(guarded.clone(), input(&[("input", json!(1))]))
                    .with_context(approved),
                ExecutionRequest::new(guarded, input(&[("input", json!(2))])).with_context(denied),
            ],
        )
        .await;

    assert!(results[0].success);
    assert_eq!(results[0].attempts, 1);
    // Only a boolean true counts as approval
    assert!(!results[1].success);
    assert_eq!(results[1].attempts, 0);
    assert!(matches!(results[1].error, Some(ExecError::ApprovalRequired { .. })));
}

#[tokio::test]
async fn test_cancel_batch_while_queued() {
    let executor = Executor::with_max_concurrency(1);
    let cap: Arc<dyn Capability> = Arc::new(sleeper("slow", 300, 0));
    let requests: Vec<_> = (0..4)
        .map(|i| ExecutionRequest::new(cap.clone(), input(&[("input", json!(i))])))
        .collect();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let results = executor.execute_batch(&cancel, requests).await;
    assert!(started.elapsed() < Duration::from_millis(1_000));

    let queued = results
        .iter()
        .filter(|r| matches!(r.error, Some(ExecError::SlotAcquisitionCancelled)))
        .count();
    assert_eq!(queued, 3);
    assert!(results.iter().all(|r| !r.success));
}
