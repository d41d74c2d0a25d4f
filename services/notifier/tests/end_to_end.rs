//! Producer run through to webhook delivery, with the in-memory store
//! standing in for S3 and its event notifications.

use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use digest_notifier::{NotifierConfig, NotifyOutcome, StorageNotifier, WebhookUrl};
use digest_producer::{EntryTranslator, ProducerConfig, ReportJob, RunOutcome, StaticFeed};
use digest_store::{ManualClock, MemoryObjectStore, S3Config, S3LinkSigner};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>What's New</title>
    <link>https://aws.amazon.com/new/</link>
    <description>Announcements</description>
    <item>
      <title>New Service X</title>
      <link>https://example.com/service-x</link>
      <pubDate>Sat, 01 Jun 2024 10:00:00 +0000</pubDate>
      <description>Service X is now generally available.</description>
    </item>
    <item>
      <title>Update Y</title>
      <link>https://example.com/update-y</link>
      <pubDate>Sun, 02 Jun 2024 10:00:00 +0000</pubDate>
      <description>Y gains a new option.</description>
    </item>
  </channel>
</rss>"#;

const KEY: &str = "reports/2024-06-03T00:00:00.html";

async fn webhook_server() -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let router = Router::new().route(
        "/hook",
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().push(body);
                "ok"
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}/hook", addr), received)
}

fn signer() -> Arc<S3LinkSigner> {
    Arc::new(S3LinkSigner::from_static_credentials(
        &S3Config::default(),
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
    ))
}

#[tokio::test]
async fn test_report_is_published_and_announced_once() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemoryObjectStore::with_clock("reports-bucket", clock.clone()));

    // Producer run
    let mut producer_config = ProducerConfig::default();
    producer_config.storage.bucket = Some("reports-bucket".to_string());
    let job = ReportJob::from_config(
        &producer_config,
        Arc::new(StaticFeed::new(FEED)),
        EntryTranslator::disabled(),
        store.clone(),
        clock.clone(),
    );

    let outcome = job.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Published { entries: 2, .. }));

    let stored = store.get(KEY).expect("report stored under the run key");
    let html = String::from_utf8(stored.body.to_vec()).unwrap();
    let first = html.find("New Service X").unwrap();
    let second = html.find("Update Y").unwrap();
    assert!(first < second);

    // Storage-create event delivered to the notifier
    let events = store.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].object_key, KEY);

    let (webhook_url, received) = webhook_server().await;
    let mut notifier_config = NotifierConfig::default();
    notifier_config.storage.bucket = Some("reports-bucket".to_string());
    notifier_config.notifier.webhook_url = Some(WebhookUrl::new(webhook_url));
    notifier_config.validate().unwrap();

    let notifier = StorageNotifier::from_config(&notifier_config, signer(), clock.clone()).unwrap();
    let outcomes = notifier.handle_batch(&events).await.unwrap();

    let link = match &outcomes[..] {
        [NotifyOutcome::Notified { link: Some(link) }] => link.clone(),
        other => panic!("unexpected outcomes: {:?}", other),
    };

    let messages = received.lock();
    assert_eq!(messages.len(), 1);

    let text = messages[0]["text"].as_str().unwrap();
    assert!(text.contains(&link.url));

    // Presigned URLs percent-encode the colons in the key
    let path = link.url.split('?').next().unwrap().replace("%3A", ":");
    assert!(path.ends_with(KEY));
}

#[tokio::test]
async fn test_s3_notification_payload_for_other_prefix_is_skipped() {
    let (webhook_url, received) = webhook_server().await;
    let mut config = NotifierConfig::default();
    config.notifier.webhook_url = Some(WebhookUrl::new(webhook_url));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 5).unwrap(),
    ));
    let notifier = StorageNotifier::from_config(&config, signer(), clock).unwrap();

    let payload = json!({
        "Records": [{
            "eventName": "ObjectCreated:Put",
            "eventTime": "2024-06-03T00:00:05Z",
            "s3": {
                "bucket": { "name": "reports-bucket" },
                "object": { "key": "other/file.txt", "size": 12 }
            }
        }]
    });

    let outcomes = notifier
        .handle_notification(payload.to_string().as_bytes())
        .await
        .unwrap();

    assert!(matches!(outcomes[..], [NotifyOutcome::Skipped { .. }]));
    assert_eq!(notifier.delivery_attempts(), 0);
    assert!(received.lock().is_empty());
}
