use ::scraper::{ElementRef, Html, Selector};

use crate::utils::error::BrowserError;

fn parse_selector(selector: &str) -> Result<Selector, BrowserError> {
    Selector::parse(selector)
        .map_err(|e| BrowserError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first element matching `selector`, whitespace collapsed.
pub fn extract_text(html: &str, selector: &str) -> Result<Option<String>, BrowserError> {
    let css_selector = parse_selector(selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&css_selector)
        .next()
        .map(|element| element_text(&element))
        .filter(|text| !text.is_empty()))
}

/// Rows of `td` cells below the first element matching `selector`.
///
/// Header rows (no `td`) are skipped. A cell with no text but an `img`
/// yields the image `src`, so thumbnail columns stay addressable.
pub fn extract_table(html: &str, selector: &str) -> Result<Vec<Vec<String>>, BrowserError> {
    let css_selector = parse_selector(selector)?;
    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td")?;
    let img_selector = parse_selector("img")?;
    let document = Html::parse_document(html);

    let Some(container) = document.select(&css_selector).next() else {
        return Ok(Vec::new());
    };

    let rows = container
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| {
                    let text = element_text(&cell);
                    if text.is_empty() {
                        cell.select(&img_selector)
                            .next()
                            .and_then(|img| img.value().attr("src"))
                            .map(str::to_string)
                            .unwrap_or_default()
                    } else {
                        text
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(rows)
}
