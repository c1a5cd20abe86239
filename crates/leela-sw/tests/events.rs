mod common;

use bytes::Bytes;
use common::{get, url, worker, ScriptedFetcher};
use http::Method;
use leela_net::Request;
use leela_sw::{EventOutcome, ServiceWorkerError, WorkerEvent};

async fn push(
    worker: &leela_sw::ServiceWorker<ScriptedFetcher>,
    json: &'static str,
) -> leela_sw::NotificationId {
    match worker
        .dispatch(WorkerEvent::Push {
            data: Some(Bytes::from_static(json.as_bytes())),
        })
        .await
        .unwrap()
    {
        EventOutcome::NotificationShown(id) => id,
        other => panic!("expected a notification, got {other:?}"),
    }
}

#[tokio::test]
async fn push_shows_notification_and_open_click_opens_window() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);

    let id = push(&worker, r#"{"title":"T","body":"B","url":"/x"}"#).await;
    {
        let notifications = worker.notifications().read().await;
        let shown = notifications.get(id).unwrap();
        assert_eq!(shown.title, "T");
        assert_eq!(shown.body, "B");
        assert_eq!(shown.icon, "/icon-192x192.png");
    }

    let outcome = worker
        .dispatch(WorkerEvent::NotificationClick {
            notification_id: id,
            action: Some("open".to_string()),
        })
        .await
        .unwrap();

    let EventOutcome::WindowOpened(client) = outcome else {
        panic!("expected a window, got {outcome:?}");
    };
    assert_eq!(client.url.as_str(), "https://leela.test/x");
    assert!(worker.notifications().read().await.is_empty());
    assert_eq!(worker.clients().read().await.len(), 1);
}

#[tokio::test]
async fn open_click_without_url_opens_root() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);
    let id = push(&worker, r#"{"title":"Sale"}"#).await;

    let outcome = worker
        .handle_notification_click(id, Some("open"))
        .await
        .unwrap();

    let EventOutcome::WindowOpened(client) = outcome else {
        panic!("expected a window, got {outcome:?}");
    };
    assert_eq!(client.url.as_str(), "https://leela.test/");
}

#[tokio::test]
async fn close_click_only_closes() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);
    let id = push(&worker, r#"{"title":"T","url":"/x"}"#).await;

    let outcome = worker
        .handle_notification_click(id, Some("close"))
        .await
        .unwrap();

    assert!(matches!(outcome, EventOutcome::Handled));
    assert!(worker.clients().read().await.is_empty());
    assert!(worker.notifications().read().await.is_empty());

    let err = worker
        .handle_notification_click(id, Some("open"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceWorkerError::NotFound(_)));
}

#[tokio::test]
async fn push_without_data_is_ignored() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);

    let outcome = worker
        .dispatch(WorkerEvent::Push { data: None })
        .await
        .unwrap();

    assert!(matches!(outcome, EventOutcome::Ignored));
    assert!(worker.notifications().read().await.is_empty());
}

#[tokio::test]
async fn push_with_malformed_payload_fails() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);

    let err = worker
        .dispatch(WorkerEvent::Push {
            data: Some(Bytes::from_static(b"plain text")),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceWorkerError::InvalidPayload(_)));
}

#[tokio::test]
async fn contact_form_sync_is_handled() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);

    let handled = worker
        .dispatch(WorkerEvent::Sync {
            tag: "contact-form".to_string(),
        })
        .await
        .unwrap();
    let ignored = worker
        .dispatch(WorkerEvent::Sync {
            tag: "newsletter".to_string(),
        })
        .await
        .unwrap();

    assert!(matches!(handled, EventOutcome::Handled));
    assert!(matches!(ignored, EventOutcome::Ignored));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn non_get_requests_pass_through() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);

    let outcome = worker
        .dispatch(WorkerEvent::Fetch(Request::new(
            Method::POST,
            url("/api/contact"),
        )))
        .await
        .unwrap();

    assert!(matches!(outcome, EventOutcome::PassThrough));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn non_http_requests_pass_through() {
    let fetcher = ScriptedFetcher::new();
    let worker = worker(&fetcher);

    let request = Request::parse("chrome-extension://abcdef/script.js").unwrap();
    let outcome = worker.handle_fetch(request).await.unwrap();

    assert!(matches!(outcome, EventOutcome::PassThrough));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn retired_worker_stops_intercepting() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond("/api/services", 200, "[]");
    let worker = worker(&fetcher);
    worker.retire().await;

    let outcome = worker.handle_fetch(get("/api/services")).await.unwrap();
    assert!(matches!(outcome, EventOutcome::PassThrough));

    let err = worker.fetch(get("/api/services")).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::NotFound(_)));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn fetch_event_dispatches_to_strategy() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond("/api/services", 200, "[]");
    let worker = worker(&fetcher);

    let outcome = worker
        .dispatch(WorkerEvent::Fetch(get("/api/services")))
        .await
        .unwrap();

    let EventOutcome::Response(response) = outcome else {
        panic!("expected a response, got {outcome:?}");
    };
    assert_eq!(response.text().unwrap(), "[]");
}
