use std::sync::LazyLock;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use scraper::{Html, Selector};
use tracing::info;
use url::Url;

// The DGMS page wraps its content in a #skipmaincontent container; anchors
// outside it are navigation chrome.
static PDF_ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#skipmaincontent a[href]").unwrap());

/// Fetch the alerts page HTML.
pub async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<String> {
    info!("Fetching page: {}", url);
    let resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, "alert-watcher/1.0")
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?
        .error_for_status()?;
    Ok(resp.text().await?)
}

/// Find PDF links on the page and map normalized name -> resolved URL.
///
/// Relative hrefs are resolved against `base_url`. A later anchor with the
/// same normalized name overwrites the earlier URL.
pub fn extract_pdf_links(html: &str, base_url: &str) -> IndexMap<String, String> {
    let mut found = IndexMap::new();
    let Ok(base) = Url::parse(base_url) else {
        return found;
    };

    let doc = Html::parse_document(html);
    for anchor in doc.select(&PDF_ANCHORS) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if href.is_empty() || !href.to_ascii_lowercase().ends_with(".pdf") {
            continue;
        }
        let Ok(full) = base.join(href) else {
            continue;
        };
        if let Some(name) = normalize_name(&full) {
            found.insert(name, full.to_string());
        }
    }
    found
}

/// Derive the dedup key for a document URL: final path segment,
/// percent-decoded, lower-cased, `.pdf` suffix stripped.
pub fn normalize_name(url: &Url) -> Option<String> {
    let basename = url.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let decoded = urlencoding::decode(basename).ok()?;
    let lowered = decoded.to_lowercase();
    let name = lowered.strip_suffix(".pdf").unwrap_or(&lowered);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.dgms.gov.in/UserView/index?mid=1362";

    fn page(body: &str) -> String {
        format!("<html><body><div id=\"skipmaincontent\">{}</div></body></html>", body)
    }

    #[test]
    fn percent_encoded_name_is_decoded_and_lowered() {
        let url = Url::parse("https://x/writereaddata/Alert%20No%2012.PDF").unwrap();
        assert_eq!(normalize_name(&url).unwrap(), "alert no 12");
    }

    #[test]
    fn case_variants_collide_to_one_name() {
        let a = Url::parse("https://x/foo.pdf").unwrap();
        let b = Url::parse("https://x/FOO.PDF").unwrap();
        assert_eq!(normalize_name(&a), normalize_name(&b));
        assert_eq!(normalize_name(&a).unwrap(), "foo");
    }

    #[test]
    fn bare_suffix_yields_no_name() {
        let url = Url::parse("https://x/.pdf").unwrap();
        assert_eq!(normalize_name(&url), None);
    }

    #[test]
    fn relative_hrefs_resolve_against_base() {
        let html = page(r#"<a href="/writereaddata/Alert%201.pdf">Alert 1</a>"#);
        let links = extract_pdf_links(&html, BASE);
        assert_eq!(
            links["alert 1"],
            "https://www.dgms.gov.in/writereaddata/Alert%201.pdf"
        );
    }

    #[test]
    fn non_pdf_and_outside_container_anchors_are_ignored() {
        let html = r#"<html><body>
              <a href="/outside.pdf">outside</a>
              <div id="skipmaincontent">
                <a href="/a.pdf">a</a>
                <a href="/notes.html">notes</a>
                <a href="/b.PDF">b</a>
              </div>
            </body></html>"#;
        let links = extract_pdf_links(html, BASE);
        let names: Vec<_> = links.keys().cloned().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_names_keep_the_last_url() {
        let html = page(
            r#"<a href="/old/foo.pdf">first</a>
               <a href="/new/FOO.PDF">second</a>"#,
        );
        let links = extract_pdf_links(&html, BASE);
        assert_eq!(links.len(), 1);
        assert_eq!(links["foo"], "https://www.dgms.gov.in/new/FOO.PDF");
    }

    #[test]
    fn page_without_container_yields_empty_map() {
        let links = extract_pdf_links("<html><body><a href='/a.pdf'>a</a></body></html>", BASE);
        assert!(links.is_empty());
    }

    #[test]
    fn page_order_is_preserved() {
        let html = page(
            r#"<a href="/c.pdf">c</a>
               <a href="/a.pdf">a</a>
               <a href="/b.pdf">b</a>"#,
        );
        let links = extract_pdf_links(&html, BASE);
        let names: Vec<_> = links.keys().cloned().collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
