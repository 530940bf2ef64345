//! Bitget 커넥터 HTTP 통합 테스트 (mockito 서버 사용).

use extractor_core::{OrderCategory, StreamKey, TimeWindow};
use extractor_exchange::{BitgetClient, BitgetConfig, FetchError, PageFetcher, PageQuery};
use std::time::Instant;
use mockito::{Matcher, Server};
use rust_decimal_macros::dec;
use std::time::Duration;

const SPOT_PATH: &str = "/api/v2/spot/trade/history-orders";
const FUTURES_PATH: &str = "/api/mix/v1/order/history";

fn client_for(server: &Server) -> BitgetClient {
    let config =
        BitgetConfig::new("test-key", "test-secret", "test-pass").with_base_url(server.url());
    BitgetClient::new(config).expect("client")
}

fn query(key: StreamKey, cursor: Option<&str>) -> PageQuery {
    PageQuery {
        key,
        cursor: cursor.map(str::to_string),
        page_size: 100,
        timeout: Duration::from_secs(5),
        window: TimeWindow::new(Some(1_700_000_000_000), Some(1_700_100_000_000)),
    }
}

#[tokio::test]
async fn test_spot_page_signed_request_and_cursor() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", SPOT_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
            Matcher::UrlEncoded("tpslType".into(), "normal".into()),
            Matcher::UrlEncoded("startTime".into(), "1700000000000".into()),
            Matcher::UrlEncoded("endTime".into(), "1700100000000".into()),
        ]))
        .match_header("ACCESS-KEY", "test-key")
        .match_header("ACCESS-PASSPHRASE", "test-pass")
        .match_header("ACCESS-SIGN", Matcher::Any)
        .match_header("ACCESS-TIMESTAMP", Matcher::Regex(r"^\d{13}$".into()))
        .match_header("locale", "en-US")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"code":"00000","msg":"success","data":[
                {"orderId":"1003","symbol":"BTCUSDT","side":"buy","status":"filled",
                 "orderType":"limit","price":"27000.5","size":"0.01","baseVolume":"0.01",
                 "cTime":"1700000500000","uTime":"1700000600000"},
                {"orderId":"1001","symbol":"BTCUSDT","side":"sell","status":"cancelled",
                 "price":"28000","size":"0.02","cTime":"1700000100000"}
            ]}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let mut spot_query = query(StreamKey::spot_normal("BTCUSDT"), None);
    spot_query.page_size = 2;
    let page = client.fetch_page(&spot_query).await.expect("page");

    mock.assert_async().await;
    assert_eq!(page.count(), 2);
    assert_eq!(page.next_cursor.as_deref(), Some("1001"));

    let first = &page.orders[0];
    assert_eq!(first.order_id, "1003");
    assert_eq!(first.category, OrderCategory::SpotNormal);
    assert_eq!(first.price, Some(dec!(27000.5)));
    assert_eq!(first.created_at, Some(1_700_000_500_000));
}

#[tokio::test]
async fn test_spot_tpsl_page_sends_cursor() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", SPOT_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("tpslType".into(), "tpsl".into()),
            Matcher::UrlEncoded("idLessThan".into(), "1001".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"code":"00000","msg":"success","data":[]}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let page = client
        .fetch_page(&query(StreamKey::spot_tpsl("BTCUSDT"), Some("1001")))
        .await
        .expect("page");

    mock.assert_async().await;
    assert!(page.is_empty());
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_futures_page_follows_next_flag() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", FUTURES_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT_UMCBL".into()),
            Matcher::UrlEncoded("pageSize".into(), "100".into()),
            Matcher::UrlEncoded("lastEndId".into(), "900".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"code":"00000","msg":"success","data":{
                "nextFlag":true,"endId":"850",
                "orderList":[
                  {"orderId":"880","symbol":"BTCUSDT_UMCBL","size":1,"price":"27000",
                   "filledQty":"1","leverage":"10","marginMode":"crossed","marginCoin":"USDT",
                   "posSide":"long","side":"open_long","state":"filled","cTime":"1700000200000"}
                ]}}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let page = client
        .fetch_page(&query(StreamKey::futures("BTCUSDT", "UMCBL"), Some("900")))
        .await
        .expect("page");

    mock.assert_async().await;
    assert_eq!(page.count(), 1);
    assert_eq!(page.next_cursor.as_deref(), Some("850"));

    let order = &page.orders[0];
    assert_eq!(order.category, OrderCategory::Futures("UMCBL".into()));
    assert_eq!(order.size, Some(dec!(1)));
    assert_eq!(order.leverage, Some(dec!(10)));
    assert_eq!(order.margin_coin.as_deref(), Some("USDT"));
    assert_eq!(order.position_side.as_deref(), Some("long"));
}

#[tokio::test]
async fn test_futures_last_page_has_no_cursor() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", FUTURES_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"code":"00000","msg":"success","data":{"nextFlag":false,"endId":"10","orderList":null}}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let page = client
        .fetch_page(&query(StreamKey::futures("BTCUSDT", "DMCBL"), None))
        .await
        .expect("page");

    assert!(page.is_empty());
    assert_eq!(page.next_cursor, None);
}

async fn spot_error_for(status: usize, body: &str) -> FetchError {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", SPOT_PATH)
        .match_query(Matcher::Any)
        .with_status(status)
        .with_body(body)
        .create_async()
        .await;

    client_for(&server)
        .fetch_page(&query(StreamKey::spot_normal("BTCUSDT"), None))
        .await
        .expect_err("should fail")
}

#[tokio::test]
async fn test_error_mapping_from_http_responses() {
    let err = spot_error_for(401, r#"{"code":"40006","msg":"Invalid ACCESS_KEY"}"#).await;
    assert!(matches!(err, FetchError::Unauthorized(_)), "{:?}", err);

    let err = spot_error_for(429, r#"{"code":"429","msg":"Too Many Requests"}"#).await;
    assert!(matches!(err, FetchError::RateLimited(_)), "{:?}", err);

    let err = spot_error_for(400, r#"{"code":"40034","msg":"Parameter BTCXXX does not exist"}"#).await;
    assert!(matches!(err, FetchError::SymbolNotFound(_)), "{:?}", err);

    let err = spot_error_for(500, "<html>bad gateway</html>").await;
    assert!(matches!(err, FetchError::NetworkError(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unparseable_success_body_is_network_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", SPOT_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .fetch_page(&query(StreamKey::spot_normal("BTCUSDT"), None))
        .await
        .expect_err("should fail");

    assert!(matches!(err, FetchError::NetworkError(_)));
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn spot_order(id: u64) -> String {
    format!(
        r#"{{"orderId":"{}","symbol":"BTCUSDT","side":"buy","status":"filled","cTime":"1700000000000"}}"#,
        id
    )
}

fn spot_body(ids: &[u64]) -> String {
    let orders: Vec<String> = ids.iter().map(|&id| spot_order(id)).collect();
    format!(r#"{{"code":"00000","msg":"success","data":[{}]}}"#, orders.join(","))
}

async fn mock_spot_chunk(
    server: &mut Server,
    start: i64,
    end: i64,
    extra: Vec<Matcher>,
    ids: &[u64],
) -> mockito::Mock {
    let mut matchers = vec![
        Matcher::UrlEncoded("startTime".into(), start.to_string()),
        Matcher::UrlEncoded("endTime".into(), end.to_string()),
    ];
    matchers.extend(extra);
    server
        .mock("GET", SPOT_PATH)
        .match_query(Matcher::AllOf(matchers))
        .with_status(200)
        .with_body(spot_body(ids))
        .create_async()
        .await
}

#[tokio::test]
async fn test_long_spot_window_is_split_into_chunks() {
    let mut server = Server::new_async().await;
    let start = 1_700_000_000_000;
    let end = start + 70 * DAY_MS;
    let newest = mock_spot_chunk(
        &mut server,
        end - 30 * DAY_MS,
        end,
        vec![Matcher::UrlEncoded("limit".into(), "100".into())],
        &[3005, 3004],
    )
    .await;
    let middle = mock_spot_chunk(
        &mut server,
        end - 60 * DAY_MS - 1,
        end - 30 * DAY_MS - 1,
        vec![Matcher::UrlEncoded("limit".into(), "98".into())],
        &[2001],
    )
    .await;
    let oldest = mock_spot_chunk(
        &mut server,
        start,
        end - 60 * DAY_MS - 2,
        vec![Matcher::UrlEncoded("limit".into(), "97".into())],
        &[],
    )
    .await;

    let mut spot_query = query(StreamKey::spot_normal("BTCUSDT"), None);
    spot_query.window = TimeWindow::new(Some(start), Some(end));
    let page = client_for(&server).fetch_page(&spot_query).await.expect("page");

    newest.assert_async().await;
    middle.assert_async().await;
    oldest.assert_async().await;
    let ids: Vec<&str> = page.orders.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(ids, vec!["3005", "3004", "2001"]);
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_chunked_spot_cursor_moves_to_older_chunk() {
    let mut server = Server::new_async().await;
    let start = 1_700_000_000_000;
    let end = start + 45 * DAY_MS;
    let window = TimeWindow::new(Some(start), Some(end));

    let full_newest = mock_spot_chunk(
        &mut server,
        end - 30 * DAY_MS,
        end,
        vec![],
        &[5002, 5001],
    )
    .await;

    let mut spot_query = query(StreamKey::spot_tpsl("BTCUSDT"), None);
    spot_query.window = window;
    spot_query.page_size = 2;
    let client = client_for(&server);
    let first = client.fetch_page(&spot_query).await.expect("first page");

    full_newest.assert_async().await;
    assert_eq!(first.next_cursor.as_deref(), Some("0:5001"));
    full_newest.remove_async().await;

    let drained_newest = mock_spot_chunk(
        &mut server,
        end - 30 * DAY_MS,
        end,
        vec![Matcher::UrlEncoded("idLessThan".into(), "5001".into())],
        &[],
    )
    .await;
    let older = mock_spot_chunk(&mut server, start, end - 30 * DAY_MS - 1, vec![], &[4002, 4001])
        .await;

    spot_query.cursor = first.next_cursor.clone();
    let second = client.fetch_page(&spot_query).await.expect("second page");

    drained_newest.assert_async().await;
    older.assert_async().await;
    assert_eq!(second.count(), 2);
    assert_eq!(second.next_cursor.as_deref(), Some("1:4001"));
}

#[tokio::test]
async fn test_requests_are_throttled_per_market() {
    let mut server = Server::new_async().await;
    let _spot = server
        .mock("GET", SPOT_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(spot_body(&[]))
        .expect(3)
        .create_async()
        .await;
    let _futures = server
        .mock("GET", FUTURES_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"code":"00000","msg":"success","data":{"nextFlag":false}}"#)
        .create_async()
        .await;

    let config = BitgetConfig::new("test-key", "test-secret", "test-pass")
        .with_base_url(server.url())
        .with_rate_limits(1, 1);
    let client = BitgetClient::new(config).expect("client");
    let spot = query(StreamKey::spot_normal("BTCUSDT"), None);

    let started = Instant::now();
    for _ in 0..3 {
        client.fetch_page(&spot).await.expect("spot page");
    }
    // 두 번째, 세 번째 요청은 각각 최대 500ms 대기
    assert!(started.elapsed() >= Duration::from_millis(900));

    // futures 한도는 spot과 별개
    let futures_started = Instant::now();
    client
        .fetch_page(&query(StreamKey::futures("BTCUSDT", "UMCBL"), None))
        .await
        .expect("futures page");
    assert!(futures_started.elapsed() < Duration::from_millis(400));
}
