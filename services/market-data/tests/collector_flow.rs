//! End-to-end tests for the collector
//!
//! Drives a recorded JSON-lines capture through `JsonLinesFeed` and the
//! collector loop, then inspects the dataset:
//! - Routing of depth, ticker and execution channels
//! - Settlement tier from spot and leveraged tickers
//! - Fill reconciliation across batches
//! - Identical state from two replays of the same capture

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use market_data::clock::{ManualClock, TimeSource};
use market_data::events::{DepthMessage, ExecutionBatch, ExecutionRecord, Quote};
use market_data::order_book::PriceLevel;
use market_data::{Collector, CollectorConfig, FeedEvent, JsonLinesFeed, Notification, NotificationKind};
use rust_decimal::Decimal;
use tokio::io::BufReader;
use types::ids::{InstrumentId, OrderId};
use types::order::Side;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

fn level(price: &str, size: &str) -> PriceLevel {
    PriceLevel::new(dec(price), dec(size))
}

fn quote(instrument: &str, ts: &str, ltp: &str) -> FeedEvent {
    let ltp = dec(ltp);
    FeedEvent::Quote(Quote {
        instrument: InstrumentId::new(instrument),
        timestamp: ts.to_string(),
        best_bid_price: ltp - Decimal::ONE,
        best_bid_size: dec("0.5"),
        best_ask_price: ltp + Decimal::ONE,
        best_ask_size: dec("0.7"),
        total_bid_depth: dec("1200"),
        total_ask_depth: dec("1100"),
        last_traded_price: ltp,
        volume_24h: dec("250000"),
    })
}

fn execution(ts: &str, side: Side, price: &str, size: &str, buy: &str, sell: &str) -> ExecutionRecord {
    ExecutionRecord {
        timestamp: ts.to_string(),
        side,
        price: dec(price),
        size: dec(size),
        buy_order_id: OrderId::from(buy),
        sell_order_id: OrderId::from(sell),
    }
}

fn capture() -> String {
    let fx = InstrumentId::new("FX_BTC_JPY");
    let events = vec![
        FeedEvent::DepthSnapshot(DepthMessage {
            instrument: fx.clone(),
            mid_price: dec("1050000"),
            asks: vec![level("1050010", "0.1"), level("1050020", "0.2"), level("1049990", "9")],
            bids: vec![level("1049990", "0.3"), level("1049980", "0.4")],
        }),
        FeedEvent::DepthDiff(DepthMessage {
            instrument: fx.clone(),
            mid_price: dec("1050000"),
            asks: vec![level("1050010", "0"), level("1050015", "1.5")],
            bids: vec![level("1049995", "0.05")],
        }),
        quote("BTC_JPY", "2024-01-01T00:00:00.100Z", "1000000"),
        quote("FX_BTC_JPY", "2024-01-01T00:00:00.200Z", "1050000"),
        FeedEvent::Executions(ExecutionBatch {
            instrument: fx.clone(),
            executions: vec![
                execution("2024-01-01T00:00:00.300Z", Side::BUY, "100", "1", "X", "M1"),
                execution("2024-01-01T00:00:00.400Z", Side::SELL, "99", "0.5", "M2", "Y"),
            ],
        }),
        FeedEvent::Executions(ExecutionBatch {
            instrument: fx,
            executions: vec![execution("2024-01-01T00:00:00.500Z", Side::BUY, "102", "1", "X", "M3")],
        }),
    ];

    let mut lines: Vec<String> = events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    lines.insert(2, "{\"event_type\":\"Unknown\"}".to_string());
    lines.join("\n")
}

fn collector(input: String) -> Collector<JsonLinesFeed<BufReader<Cursor<Vec<u8>>>>> {
    let wall = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap()));
    let time = Arc::new(TimeSource::local(wall));
    let config = CollectorConfig {
        time_server: None,
        ..Default::default()
    };
    let feed = JsonLinesFeed::new(BufReader::new(Cursor::new(input.into_bytes())));
    Collector::new(&config, feed, time).unwrap()
}

#[tokio::test]
async fn test_capture_routes_every_channel() {
    init_tracing();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = kinds.clone();
    let mut collector = collector(capture())
        .with_observer(move |n: Notification<'_>| sink.lock().unwrap().push(n.kind));

    collector.start().await.unwrap();
    collector.run().await.unwrap();
    collector.stop().await.unwrap();

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![
            NotificationKind::DepthChanged,
            NotificationKind::DepthChanged,
            NotificationKind::Error,
            NotificationKind::TickChanged,
            NotificationKind::TickChanged,
            NotificationKind::TradeChanged,
            NotificationKind::TradeChanged,
        ]
    );

    let dataset = collector.dataset();
    let dataset = dataset.lock().unwrap();
    let fx = InstrumentId::new("FX_BTC_JPY");

    let depth = dataset.depth(&fx).unwrap();
    assert!(depth.is_available());
    // 1049990 ask is below mid and filtered; 1050010 removed by the diff
    let asks: Vec<Decimal> = depth.ask_levels().iter().map(|l| l.price).collect();
    assert_eq!(asks, vec![dec("1050015"), dec("1050020")]);
    let bids: Vec<Decimal> = depth.bid_levels().iter().map(|l| l.price).collect();
    assert_eq!(bids, vec![dec("1049995"), dec("1049990"), dec("1049980")]);

    let settlement = dataset.settlement();
    assert_eq!(settlement.disparity_rate(), Some(dec("0.05")));
    assert_eq!(settlement.tier(), Some(1));
    assert_eq!(settlement.rate_percent(), Some(dec("0.25")));

    let trades = dataset.trades();
    let fill = trades.reconcile_buy("X").unwrap();
    assert_eq!(fill.price, dec("101"));
    assert_eq!(fill.amount, dec("2"));
    let sell = trades.reconcile_sell("Y").unwrap();
    assert_eq!(sell.price, dec("99"));
    assert_eq!(trades.last_trade().unwrap().price, dec("102"));
    assert_eq!(trades.amount(None), (dec("2"), dec("0.5")));

    let ticks = dataset.ticks(&fx).unwrap();
    assert_eq!(ticks.latest().unwrap().last_traded_price, dec("1050000"));
    assert_eq!(ticks.samples().len(), 1);

    let metrics = collector.metrics().export();
    assert_eq!(metrics["events_dispatched"], 7);
    assert_eq!(metrics["feed_errors"], 1);
}

#[tokio::test]
async fn test_replaying_capture_is_deterministic() {
    init_tracing();
    let mut first = collector(capture());
    let mut second = collector(capture());

    for collector in [&mut first, &mut second] {
        collector.start().await.unwrap();
        collector.run().await.unwrap();
    }

    let a = first.dataset();
    let b = second.dataset();
    let a = a.lock().unwrap();
    let b = b.lock().unwrap();

    for (id, data) in a.instruments() {
        let other = b.instrument(id).unwrap();
        assert_eq!(data.depth.ask_levels(), other.depth.ask_levels());
        assert_eq!(data.depth.bid_levels(), other.depth.bid_levels());
        assert_eq!(data.ticks.samples(), other.ticks.samples());
        assert_eq!(data.ticks.latest(), other.ticks.latest());
    }
    assert_eq!(a.trades().buys(), b.trades().buys());
    assert_eq!(a.trades().sells(), b.trades().sells());
    assert_eq!(a.settlement(), b.settlement());
}
