use crate::client::PortalClient;
use crate::error::RaggedPageError;
use crate::model::{Category, DirectoryRow};
use crate::rate::RateLimiter;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

static INDEX_CELLS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"td[height="32"][align="center"][width="220"]"#));
static NAME_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[target="_blank"][style="cursor:hand;"]"#));
static DATE_CELLS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"td[align="center"][width="90"]"#));
static UNIT_CELLS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"td[align="center"][width="99"]"#));
static HEADER_CELLS: LazyLock<Selector> = LazyLock::new(|| selector("strong"));

/// Consecutive failed listing pages after which a category is abandoned.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Fixed parameters of the listing endpoint query.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub div_id: String,
    pub jd_id: String,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            div_id: "div1525479".to_string(),
            jd_id: "3084".to_string(),
        }
    }
}

impl ListingQuery {
    pub fn params(&self, category: Category, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("divid", self.div_id.clone()),
            ("infotypeId", category.info_type_id().to_string()),
            ("jdid", self.jd_id.clone()),
            ("area", String::new()),
            ("sortfield", String::new()),
            ("currpage", page.to_string()),
        ]
    }
}

/// Outcome of parsing one listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRows {
    /// No row markers: the listing has run out.
    End,
    Rows(Vec<DirectoryRow>),
}

/// Parse one listing page into rows. Relative detail links are resolved
/// against `base`.
pub fn parse_directory_page(
    html: &str,
    page: u32,
    base: &Url,
) -> Result<PageRows, RaggedPageError> {
    let document = Html::parse_document(html);

    let index: Vec<String> = document.select(&INDEX_CELLS).map(element_text).collect();
    if index.is_empty() {
        return Ok(PageRows::End);
    }

    let name_links: Vec<ElementRef<'_>> = document.select(&NAME_LINKS).collect();
    let dates: Vec<String> = document.select(&DATE_CELLS).map(element_text).collect();
    let units: Vec<String> = document.select(&UNIT_CELLS).map(element_text).collect();

    if name_links.len() != index.len() || dates.len() != index.len() || units.len() != index.len()
    {
        return Err(RaggedPageError {
            page,
            index: index.len(),
            names: name_links.len(),
            dates: dates.len(),
            units: units.len(),
        });
    }

    let rows = index
        .into_iter()
        .zip(name_links)
        .zip(dates)
        .zip(units)
        .map(|(((index, link), date), source_unit)| {
            let href = link.value().attr("href").unwrap_or_default();
            let detail_link = base
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string());
            DirectoryRow {
                index,
                name: element_text(link),
                date,
                source_unit,
                detail_link,
            }
        })
        .collect();

    Ok(PageRows::Rows(rows))
}

/// Column titles of the directory listing plus the trailing link column.
pub fn parse_directory_header(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut header: Vec<String> = document.select(&HEADER_CELLS).map(element_text).collect();
    header.push("url".to_string());
    header
}

/// Everything gathered for one category.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    pub category: Category,
    pub rows: Vec<DirectoryRow>,
    /// Page requests issued, including the terminating empty page.
    pub pages_requested: u32,
    pub ragged_pages: Vec<RaggedPageError>,
    pub failed_pages: Vec<u32>,
}

impl DirectoryListing {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            rows: Vec::new(),
            pages_requested: 0,
            ragged_pages: Vec::new(),
            failed_pages: Vec::new(),
        }
    }
}

/// Walks the listing endpoint page by page.
pub struct DirectoryFetcher<'a> {
    client: &'a PortalClient,
    listing_url: Url,
    query: ListingQuery,
    every_n: u32,
    pause: Duration,
}

impl<'a> DirectoryFetcher<'a> {
    pub fn new(client: &'a PortalClient, listing_url: Url) -> Self {
        Self {
            client,
            listing_url,
            query: ListingQuery::default(),
            every_n: 10,
            pause: Duration::from_secs(5),
        }
    }

    pub fn with_query(mut self, query: ListingQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_pacing(mut self, every_n: u32, pause: Duration) -> Self {
        self.every_n = every_n;
        self.pause = pause;
        self
    }

    /// Fetch page 1 of the leader listing and read its column titles.
    pub async fn fetch_header(&self) -> crate::error::Result<Vec<String>> {
        let html = self
            .client
            .get_html(
                self.listing_url.as_str(),
                &self.query.params(Category::Leader, 1),
            )
            .await?;
        Ok(parse_directory_header(&html))
    }

    /// Fetch every page of `category` until a page without row markers.
    pub async fn fetch_directory(&self, category: Category) -> DirectoryListing {
        info!(category = category.as_str(), "Fetching directory");

        let mut listing = DirectoryListing::new(category);
        let mut limiter = RateLimiter::new(self.every_n, self.pause);
        let mut consecutive_failures = 0;
        let mut page = 0u32;

        loop {
            page += 1;
            limiter.tick().await;
            listing.pages_requested += 1;

            let html = match self
                .client
                .get_html(self.listing_url.as_str(), &self.query.params(category, page))
                .await
            {
                Ok(html) => {
                    consecutive_failures = 0;
                    html
                }
                Err(e) => {
                    warn!(category = category.as_str(), page, "Listing page failed: {}", e);
                    listing.failed_pages.push(page);
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        warn!(
                            category = category.as_str(),
                            "Giving up after {} failed pages in a row", consecutive_failures
                        );
                        break;
                    }
                    continue;
                }
            };

            match parse_directory_page(&html, page, &self.listing_url) {
                Ok(PageRows::End) => {
                    info!(
                        category = category.as_str(),
                        pages = page - 1,
                        rows = listing.rows.len(),
                        "Directory complete"
                    );
                    break;
                }
                Ok(PageRows::Rows(rows)) => {
                    debug!(category = category.as_str(), page, rows = rows.len(), "Page parsed");
                    listing.rows.extend(rows);
                }
                Err(e) => {
                    warn!(category = category.as_str(), "Dropping page: {}", e);
                    listing.ragged_pages.push(e);
                }
            }
        }

        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://www.qz.gov.cn/module/xxgk/search.jsp").unwrap()
    }

    fn listing_html(rows: &[(&str, &str, &str, &str, &str)]) -> String {
        let mut html = String::from("<html><body><table>");
        html.push_str("<tr><td><strong>序号</strong></td><td><strong>名称</strong></td>");
        html.push_str("<td><strong>日期</strong></td><td><strong>发布机构</strong></td></tr>");
        for (index, name, href, date, unit) in rows {
            html.push_str(&format!(
                r#"<tr><td height="32" align="center" width="220">{index}</td>
                <td><a target="_blank" style="cursor:hand;" href="{href}">{name}</a></td>
                <td align="center" width="90">{date}</td>
                <td align="center" width="99">{unit}</td></tr>"#
            ));
        }
        html.push_str("</table></body></html>");
        html
    }

    #[test]
    fn test_parse_rows_and_resolve_links() {
        let html = listing_html(&[
            ("1", "张三", "/art/1.html", "2019-01-02", "市政府办公室"),
            ("2", "李四", "http://fgw.qz.gov.cn/art/2.html", "2019-01-03", "市发改委"),
        ]);

        let PageRows::Rows(rows) = parse_directory_page(&html, 1, &base()).unwrap() else {
            panic!("expected rows");
        };

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "张三");
        assert_eq!(rows[0].detail_link, "http://www.qz.gov.cn/art/1.html");
        assert_eq!(rows[1].detail_link, "http://fgw.qz.gov.cn/art/2.html");
        assert_eq!(rows[1].source_unit, "市发改委");
    }

    #[test]
    fn test_page_without_markers_is_end() {
        let html = "<html><body><p>暂无数据</p></body></html>";
        assert_eq!(parse_directory_page(html, 4, &base()).unwrap(), PageRows::End);
    }

    #[test]
    fn test_ragged_page_is_rejected() {
        let html = r#"<html><body><table>
            <tr><td height="32" align="center" width="220">1</td>
            <td><a target="_blank" style="cursor:hand;" href="/a">甲</a></td>
            <td align="center" width="90">2019-01-01</td></tr>
            <tr><td height="32" align="center" width="220">2</td>
            <td><a target="_blank" style="cursor:hand;" href="/b">乙</a></td>
            <td align="center" width="90">2019-01-01</td>
            <td align="center" width="99">某局</td></tr>
            </table></body></html>"#;

        let err = parse_directory_page(html, 3, &base()).unwrap_err();
        assert_eq!(err.page, 3);
        assert_eq!(err.index, 2);
        assert_eq!(err.units, 1);
    }

    #[test]
    fn test_header_appends_url_column() {
        let html = listing_html(&[]);
        assert_eq!(
            parse_directory_header(&html),
            vec!["序号", "名称", "日期", "发布机构", "url"]
        );
    }

    #[test]
    fn test_query_carries_six_keys() {
        let params = ListingQuery::default().params(Category::SubUnit, 7);
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["divid", "infotypeId", "jdid", "area", "sortfield", "currpage"]);
        assert_eq!(params[1].1, "A0104");
        assert_eq!(params[5].1, "7");
    }
}
