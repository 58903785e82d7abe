use loads_serve::{Outcome, ServeEngine};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn touch_loads_bundle(root: &std::path::Path) -> loads_bundle::Result<PathBuf> {
    let loads_path = root.join("x.loads");
    std::fs::write(&loads_path, b"[]").unwrap();
    Ok(loads_path)
}

#[tokio::test]
async fn s5_no_requests_aborts_within_first_request_timeout() {
    let engine = ServeEngine::new(touch_loads_bundle)
        .unwrap()
        .with_timeouts(Duration::from_millis(200), Duration::from_secs(30));
    let workspace_path = engine.workspace_root().to_path_buf();

    let cancel = CancellationToken::new();
    let started = Instant::now();
    let listening = engine.listen(cancel).await.unwrap();
    let outcome = listening.join().await.unwrap();
    assert_eq!(outcome, Outcome::AbortedNoClient);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!workspace_path.exists());
}

#[tokio::test]
async fn s6_idle_timeout_after_requests() {
    let engine = ServeEngine::new(touch_loads_bundle)
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(300));
    let cancel = CancellationToken::new();
    let listening = engine.listen(cancel).await.unwrap();
    let addr = listening.addr();

    let url = format!("http://127.0.0.1:{}/x.loads", addr.port());
    let client = reqwest::Client::new();
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("server").unwrap(), "loadsdir.py/1");

    let outcome = listening.join().await.unwrap();
    assert_eq!(outcome, Outcome::Completed);
}

#[tokio::test]
async fn cancellation_aborts_an_idle_session() {
    let engine = ServeEngine::new(touch_loads_bundle)
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(30));
    let cancel = CancellationToken::new();
    let listening = engine.listen(cancel.clone()).await.unwrap();
    cancel.cancel();
    let outcome = listening.join().await.unwrap();
    assert_eq!(outcome, Outcome::Aborted);
}
