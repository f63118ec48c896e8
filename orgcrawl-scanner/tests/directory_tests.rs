// Tests for paginated directory fetching

use orgcrawl_scanner::{Category, DirectoryFetcher, FetchPolicy, PortalClient};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = "/module/xxgk/search.jsp";

fn page(first_index: usize, names: &[&str]) -> String {
    let mut html = String::from("<html><body><table>");
    html.push_str("<tr><td><strong>序号</strong></td><td><strong>名称</strong></td></tr>");
    for (i, name) in names.iter().enumerate() {
        let index = first_index + i;
        html.push_str(&format!(
            r#"<tr><td height="32" align="center" width="220">{index}</td>
            <td><a target="_blank" style="cursor:hand;" href="/art/{index}.html">{name}</a></td>
            <td align="center" width="90">2019-05-01</td>
            <td align="center" width="99">衢州市</td></tr>"#
        ));
    }
    html.push_str("</table></body></html>");
    html
}

fn ragged_page() -> String {
    r#"<html><body><table>
    <tr><td height="32" align="center" width="220">9</td>
    <td align="center" width="90">2019-05-01</td></tr>
    </table></body></html>"#
        .to_string()
}

fn client() -> PortalClient {
    let policy = FetchPolicy {
        timeout: Duration::from_secs(5),
        retries: 0,
        backoff: Duration::from_millis(1),
    };
    PortalClient::new("orgcrawl-test", None, policy).unwrap()
}

fn listing_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}{}", server.uri(), LISTING)).unwrap()
}

async fn mount_page(server: &MockServer, category: Category, number: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("infotypeId", category.info_type_id()))
        .and(query_param("currpage", number.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_end(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(0, &[])))
        .with_priority(10)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_walks_pages_until_empty() {
    let server = MockServer::start().await;
    let ok = |body: String| ResponseTemplate::new(200).set_body_string(body);
    mount_page(&server, Category::BuiltinUnit, 1, ok(page(1, &["办公室", "人事科"]))).await;
    mount_page(&server, Category::BuiltinUnit, 2, ok(page(3, &["财务科"]))).await;
    mount_end(&server).await;

    let client = client();
    let fetcher =
        DirectoryFetcher::new(&client, listing_url(&server)).with_pacing(0, Duration::ZERO);
    let listing = fetcher.fetch_directory(Category::BuiltinUnit).await;

    assert_eq!(listing.category, Category::BuiltinUnit);
    assert_eq!(listing.pages_requested, 3);
    let names: Vec<&str> = listing.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["办公室", "人事科", "财务科"]);
    assert_eq!(
        listing.rows[2].detail_link,
        format!("{}/art/3.html", server.uri())
    );
    assert!(listing.failed_pages.is_empty());
}

#[tokio::test]
async fn test_ragged_page_is_skipped() {
    let server = MockServer::start().await;
    let ok = |body: String| ResponseTemplate::new(200).set_body_string(body);
    mount_page(&server, Category::Leader, 1, ok(page(1, &["张三"]))).await;
    mount_page(&server, Category::Leader, 2, ok(ragged_page())).await;
    mount_page(&server, Category::Leader, 3, ok(page(10, &["李四"]))).await;
    mount_end(&server).await;

    let client = client();
    let fetcher =
        DirectoryFetcher::new(&client, listing_url(&server)).with_pacing(0, Duration::ZERO);
    let listing = fetcher.fetch_directory(Category::Leader).await;

    assert_eq!(listing.rows.len(), 2);
    assert_eq!(listing.ragged_pages.len(), 1);
    assert_eq!(listing.ragged_pages[0].page, 2);
    assert_eq!(listing.pages_requested, 4);
}

#[tokio::test]
async fn test_failed_page_is_recorded_and_skipped() {
    let server = MockServer::start().await;
    mount_page(&server, Category::SubUnit, 1, ResponseTemplate::new(500)).await;
    mount_page(
        &server,
        Category::SubUnit,
        2,
        ResponseTemplate::new(200).set_body_string(page(1, &["信息中心"])),
    )
    .await;
    mount_end(&server).await;

    let client = client();
    let fetcher =
        DirectoryFetcher::new(&client, listing_url(&server)).with_pacing(0, Duration::ZERO);
    let listing = fetcher.fetch_directory(Category::SubUnit).await;

    assert_eq!(listing.failed_pages, vec![1]);
    assert_eq!(listing.rows.len(), 1);
}

#[tokio::test]
async fn test_gives_up_after_consecutive_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client();
    let fetcher =
        DirectoryFetcher::new(&client, listing_url(&server)).with_pacing(0, Duration::ZERO);
    let listing = fetcher.fetch_directory(Category::Leader).await;

    assert!(listing.rows.is_empty());
    assert_eq!(listing.failed_pages, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_header_comes_from_first_leader_page() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        Category::Leader,
        1,
        ResponseTemplate::new(200).set_body_string(page(1, &["张三"])),
    )
    .await;

    let client = client();
    let fetcher = DirectoryFetcher::new(&client, listing_url(&server));
    assert_eq!(fetcher.fetch_header().await.unwrap(), vec!["序号", "名称", "url"]);
}
