use scraper::{Html, Selector};

/// Normalize an HTML body into stable plain text: script/style/noscript
/// subtrees are dropped, then all body text is joined and every run of
/// whitespace collapses to a single space.
pub fn normalize_text(html_str: &str) -> String {
    let mut document = Html::parse_document(html_str);

    if let Some(sel) = selector("script, style, noscript") {
        let doomed: Vec<_> = document.select(&sel).map(|el| el.id()).collect();
        for id in doomed {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    let text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| document.root_element().text().collect::<Vec<_>>().join(" "));

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed content of the first `<title>` element, or empty when absent.
pub fn page_title(html_str: &str) -> String {
    let document = Html::parse_document(html_str);
    selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}
