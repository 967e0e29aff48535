// tests/dispatcher.rs
//
// Rendering + delivery: ordering, per-item isolation, template errors.

mod common;

use std::collections::BTreeMap;

use rand::seq::SliceRandom;

use common::RecordingTarget;
use market_feed_notifier::feed::types::sort_chronologically;
use market_feed_notifier::feed::{DispatchReport, NotificationDispatcher, NotificationItem};
use market_feed_notifier::notify::template::EmbedTemplate;
use market_feed_notifier::notify::{Payload, PayloadTemplate};

fn item(n: i64) -> NotificationItem {
    NotificationItem::new(format!("k{n}"), n).field("n", n.to_string())
}

#[tokio::test]
async fn sorted_batch_is_delivered_in_ascending_order() {
    let mut items: Vec<_> = (0..50).map(item).collect();
    items.shuffle(&mut rand::rng());
    sort_chronologically(&mut items);

    let target = RecordingTarget::new();
    let d = NotificationDispatcher::new("src", target.clone(), PayloadTemplate::text("{n}"));
    let report = d.deliver_all(&items).await;

    assert_eq!(report, DispatchReport { delivered: 50, failed: 0 });
    let got: Vec<i64> = target.texts().iter().map(|t| t.parse().unwrap()).collect();
    assert_eq!(got, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn one_failed_delivery_does_not_abort_siblings() {
    let target = RecordingTarget::failing_on("#2");
    let d = NotificationDispatcher::new("src", target.clone(), PayloadTemplate::text("#{n}"));
    let items: Vec<_> = (1..=3).map(item).collect();

    let report = d.deliver_all(&items).await;
    assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });
    assert_eq!(target.texts(), vec!["#1", "#3"]);
}

#[tokio::test]
async fn render_error_is_reported_per_item() {
    let target = RecordingTarget::new();
    let d = NotificationDispatcher::new("src", target.clone(), PayloadTemplate::text("{n} {extra}"));
    let items = vec![item(1), item(2).field("extra", "x"), item(3)];

    let report = d.deliver_all(&items).await;
    assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
    assert_eq!(target.texts(), vec!["2 x"]);

    let err = d.deliver(&items[0]).await.unwrap_err();
    assert!(err.to_string().contains("extra"));
}

#[tokio::test]
async fn embed_template_renders_every_part() {
    let tpl = PayloadTemplate {
        content: None,
        embed: Some(EmbedTemplate {
            title: Some("{title}".into()),
            description: None,
            url: Some("{link}".into()),
            footer: Some("{{feed}} {published}".into()),
        }),
    };
    let mut fields = BTreeMap::new();
    fields.insert("title".to_string(), "FOMC".to_string());
    fields.insert("link".to_string(), "https://e.com/a".to_string());
    fields.insert("published".to_string(), "-".to_string());

    let p: Payload = tpl.render(&fields).unwrap();
    let e = p.embed.unwrap();
    assert_eq!(e.title.as_deref(), Some("FOMC"));
    assert_eq!(e.url.as_deref(), Some("https://e.com/a"));
    assert_eq!(e.footer.as_deref(), Some("{feed} -"));
    assert!(e.description.is_none());
}
