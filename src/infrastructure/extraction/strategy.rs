//! Ordered price extraction strategies
//!
//! A chain is a static slice of [`PriceStrategy`] values evaluated in order
//! against a DOM snapshot; the first one yielding a valid price wins.

use scraper::{ElementRef, Html, Selector};
use tracing::trace;

use super::price_text::normalize_price;

/// Class fragments of struck-through or reference prices the generic scan skips
const IGNORED_PRICE_CLASSES: [&str; 4] = ["old", "regular", "barre", "crossed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStrategy {
    /// Text of a promotion-specific price element
    Promotional { selector: &'static str },
    /// Text of the regular price element
    PlainText { selector: &'static str },
    /// Machine-readable attribute such as `content` on `[itemprop="price"]`
    StructuredAttribute {
        selector: &'static str,
        attribute: &'static str,
    },
    /// Every element whose class mentions `price`, in document order
    GenericClassScan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyOutcome {
    Found(f64),
    Continue,
}

impl PriceStrategy {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Promotional { .. } => "promotional",
            Self::PlainText { .. } => "plain-text",
            Self::StructuredAttribute { .. } => "structured-attribute",
            Self::GenericClassScan => "generic-class-scan",
        }
    }

    pub fn apply(&self, document: &Html) -> StrategyOutcome {
        let price = match self {
            Self::Promotional { selector } | Self::PlainText { selector } => {
                first_text_price(document, selector)
            }
            Self::StructuredAttribute { selector, attribute } => {
                first_attribute_price(document, selector, attribute)
            }
            Self::GenericClassScan => generic_class_scan(document),
        };

        match price {
            Some(price) => StrategyOutcome::Found(price),
            None => {
                trace!("Strategy {} found nothing", self.label());
                StrategyOutcome::Continue
            }
        }
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn first_text_price(document: &Html, selector: &str) -> Option<f64> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|element| normalize_price(&element_text(&element)))
}

fn first_attribute_price(document: &Html, selector: &str, attribute: &str) -> Option<f64> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attribute))
        .find_map(normalize_price)
}

fn generic_class_scan(document: &Html) -> Option<f64> {
    let selector = Selector::parse(r#"[class*="price"]"#).ok()?;
    document
        .select(&selector)
        .filter(|element| {
            let class = element.value().attr("class").unwrap_or_default().to_ascii_lowercase();
            !IGNORED_PRICE_CLASSES.iter().any(|ignored| class.contains(ignored))
        })
        .find_map(|element| normalize_price(&element_text(&element)))
}

/// Run a chain until one strategy finds a price.
///
/// Returns the price with the label of the strategy that produced it.
pub fn run_chain(chain: &[PriceStrategy], document: &Html) -> Option<(f64, &'static str)> {
    chain.iter().find_map(|strategy| match strategy.apply(document) {
        StrategyOutcome::Found(price) => Some((price, strategy.label())),
        StrategyOutcome::Continue => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn text_strategy_reads_first_valid_match() {
        let document = doc(r#"<span class="p">Sur devis</span><span class="p">24,90 €</span>"#);
        let strategy = PriceStrategy::PlainText { selector: ".p" };
        assert_eq!(strategy.apply(&document), StrategyOutcome::Found(24.90));
    }

    #[test]
    fn attribute_strategy_ignores_text() {
        let document = doc(r#"<span itemprop="price" content="19.99">19,99 € TTC</span>"#);
        let strategy = PriceStrategy::StructuredAttribute {
            selector: r#"[itemprop="price"]"#,
            attribute: "content",
        };
        assert_eq!(strategy.apply(&document), StrategyOutcome::Found(19.99));
    }

    #[test]
    fn generic_scan_skips_old_prices() {
        let document = doc(
            r#"<span class="old-price">40,00 €</span><div class="product-price-box"><b>32,50 €</b></div>"#,
        );
        assert_eq!(PriceStrategy::GenericClassScan.apply(&document), StrategyOutcome::Found(32.5));
    }

    #[test]
    fn zero_price_continues() {
        let document = doc(r#"<span class="price">0,00 €</span>"#);
        let strategy = PriceStrategy::PlainText { selector: ".price" };
        assert_eq!(strategy.apply(&document), StrategyOutcome::Continue);
    }

    #[test]
    fn chain_stops_at_first_success() {
        let document = doc(r#"<span class="promo">15,00</span><span class="regular">18,00</span>"#);
        let chain = [
            PriceStrategy::Promotional { selector: ".missing" },
            PriceStrategy::PlainText { selector: ".promo" },
            PriceStrategy::PlainText { selector: ".regular" },
        ];
        assert_eq!(run_chain(&chain, &document), Some((15.0, "plain-text")));
    }

    #[test]
    fn invalid_selector_continues() {
        let document = doc("<span>10</span>");
        let strategy = PriceStrategy::PlainText { selector: "[[[" };
        assert_eq!(strategy.apply(&document), StrategyOutcome::Continue);
    }
}
