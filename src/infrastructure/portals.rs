//! Static per-supplier portal profiles: login flow selectors, liveness markers
//! and the price extraction chain.
//!
//! Authentication is decided from the post-submit URL only (see
//! [`PortalProfile::is_authenticated_destination`]), never from page text.

use url::Url;

use crate::domain::Supplier;
use crate::infrastructure::extraction::strategy::PriceStrategy;

#[derive(Debug)]
pub struct PortalProfile {
    pub supplier: Supplier,
    pub host_suffix: &'static str,
    pub login_url: &'static str,
    pub home_url: &'static str,
    pub email_selector: &'static str,
    pub password_selector: &'static str,
    pub submit_selector: &'static str,
    pub code_input_selector: &'static str,
    pub code_submit_selector: &'static str,
    /// Present on a product page only when the session is gone
    pub logged_out_marker: &'static str,
    /// Waited for (bounded) before extraction
    pub price_ready_selector: &'static str,
    /// Path fragments of pages that are part of the login flow
    pub login_path_fragments: &'static [&'static str],
    pub extraction_chain: &'static [PriceStrategy],
}

/// What the portal did with a password submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginClassification {
    Authenticated,
    SecondFactorRequired,
    Rejected,
}

pub static LCA: PortalProfile = PortalProfile {
    supplier: Supplier::Lca,
    host_suffix: "lca-distribution.com",
    login_url: "https://www.lca-distribution.com/authentification?back=index",
    home_url: "https://www.lca-distribution.com/",
    email_selector: "#email",
    password_selector: "#passwd",
    submit_selector: "#SubmitLogin",
    code_input_selector: r#"input[name="code"], input[name="otp"], input[name="2fa"]"#,
    code_submit_selector: r#"button[type="submit"]"#,
    logged_out_marker: "#login_form, #SubmitLogin",
    price_ready_selector: r#"#our_price_display, [itemprop="price"], .product-price, .current-price"#,
    login_path_fragments: &["authentification", "login", "2fa"],
    extraction_chain: &[
        PriceStrategy::StructuredAttribute {
            selector: r#"#our_price_display[itemprop="price"]"#,
            attribute: "content",
        },
        PriceStrategy::PlainText {
            selector: "#our_price_display",
        },
        PriceStrategy::PlainText {
            selector: ".our_price_display .price",
        },
        PriceStrategy::StructuredAttribute {
            selector: r#"[itemprop="price"]"#,
            attribute: "content",
        },
        PriceStrategy::PlainText {
            selector: ".product-price",
        },
        PriceStrategy::PlainText {
            selector: ".current-price",
        },
        PriceStrategy::GenericClassScan,
    ],
};

pub static KMLS: PortalProfile = PortalProfile {
    supplier: Supplier::Kmls,
    host_suffix: "kmls.fr",
    login_url: "https://www.kmls.fr/fr/connexion",
    home_url: "https://www.kmls.fr/fr/",
    email_selector: r#"input[name="p_Login"]"#,
    password_selector: r#"input[name="p_Pass"]"#,
    submit_selector: r#"input[name="p_Connexion"]"#,
    code_input_selector: r#"input[name="p_Code"]"#,
    code_submit_selector: r#"input[name="p_ValideCode"]"#,
    logged_out_marker: r#"input[name="p_Login"]"#,
    price_ready_selector: r#".product-price-special, .product-price, [itemprop="price"]"#,
    login_path_fragments: &["connexion", "login"],
    extraction_chain: &[
        PriceStrategy::Promotional {
            selector: ".product-price-special.active .price-new",
        },
        PriceStrategy::Promotional {
            selector: ".product-price-special .price-new",
        },
        PriceStrategy::PlainText {
            selector: ".product-price .price",
        },
        PriceStrategy::StructuredAttribute {
            selector: r#"[itemprop="price"]"#,
            attribute: "content",
        },
        PriceStrategy::GenericClassScan,
    ],
};

pub const fn profile(supplier: Supplier) -> &'static PortalProfile {
    match supplier {
        Supplier::Lca => &LCA,
        Supplier::Kmls => &KMLS,
    }
}

impl PortalProfile {
    fn on_portal(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            host == self.host_suffix || host.ends_with(&format!(".{}", self.host_suffix))
        })
    }

    fn is_login_page(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        let query = url.query().unwrap_or_default().to_ascii_lowercase();
        self.login_path_fragments
            .iter()
            .any(|fragment| path.contains(fragment) || (self.supplier == Supplier::Kmls && query.contains(fragment)))
    }

    /// The single liveness signal used after a login step.
    ///
    /// - LCA lands on the site root (`/`) once the session is accepted.
    /// - KMLS leaves the `connexion` page for any other page of the shop.
    pub fn is_authenticated_destination(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        if !self.on_portal(&url) || self.is_login_page(&url) {
            return false;
        }
        match self.supplier {
            Supplier::Lca => matches!(url.path(), "" | "/" | "/index.php"),
            Supplier::Kmls => true,
        }
    }

    /// Decide the outcome of a password submission from the settled page
    pub fn classify_login(
        &self,
        final_url: &str,
        code_prompt_present: bool,
        password_field_present: bool,
    ) -> LoginClassification {
        if self.is_authenticated_destination(final_url) {
            LoginClassification::Authenticated
        } else if code_prompt_present {
            LoginClassification::SecondFactorRequired
        } else if password_field_present {
            LoginClassification::Rejected
        } else {
            LoginClassification::SecondFactorRequired
        }
    }

    /// Whether a URL is part of the login flow (a redirect there means logged out)
    pub fn is_login_url(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|url| self.on_portal(&url) && self.is_login_page(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lca_root_is_the_authenticated_destination() {
        assert!(LCA.is_authenticated_destination("https://www.lca-distribution.com/"));
        assert!(LCA.is_authenticated_destination("https://www.lca-distribution.com"));
        assert!(!LCA.is_authenticated_destination(
            "https://www.lca-distribution.com/authentification?back=index"
        ));
        assert!(!LCA.is_authenticated_destination("https://www.lca-distribution.com/mon-compte"));
        assert!(!LCA.is_authenticated_destination("https://evil.example/?www.lca-distribution.com/"));
    }

    #[test]
    fn kmls_any_page_outside_connexion_counts() {
        assert!(KMLS.is_authenticated_destination("https://www.kmls.fr/fr/"));
        assert!(KMLS.is_authenticated_destination("https://www.kmls.fr/fr/mon-compte"));
        assert!(!KMLS.is_authenticated_destination("https://www.kmls.fr/fr/connexion"));
        assert!(!KMLS.is_authenticated_destination("https://www.kmls.fr/fr/index.awp?p=login"));
        assert!(!KMLS.is_authenticated_destination("not a url"));
    }

    #[test]
    fn classification_prefers_destination_over_page_state() {
        let home = "https://www.lca-distribution.com/";
        let login = "https://www.lca-distribution.com/authentification?back=index";

        assert_eq!(LCA.classify_login(home, true, true), LoginClassification::Authenticated);
        assert_eq!(LCA.classify_login(login, true, false), LoginClassification::SecondFactorRequired);
        assert_eq!(LCA.classify_login(login, false, true), LoginClassification::Rejected);
        assert_eq!(LCA.classify_login(login, false, false), LoginClassification::SecondFactorRequired);
    }

    #[test]
    fn profiles_are_indexed_by_supplier() {
        for supplier in Supplier::ALL {
            let portal = profile(supplier);
            assert_eq!(portal.supplier, supplier);
            assert!(!portal.extraction_chain.is_empty());
            assert_eq!(portal.extraction_chain.last(), Some(&PriceStrategy::GenericClassScan));
        }
    }
}
