/// A supported Amazon marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Market {
    /// ISO-3166 alpha-3 code used in configuration
    pub code: &'static str,

    /// Marketplace identifier
    pub marketplace_id: &'static str,

    /// Two-letter country code
    pub country_code: &'static str,

    /// Domain suffix after "amazon"
    pub suffix: &'static str,
}

/// Every marketplace the harvester knows how to address
pub const MARKETS: &[Market] = &[
    Market { code: "USA", marketplace_id: "ATVPDKIKX0DER", country_code: "US", suffix: ".com" },
    Market { code: "CAN", marketplace_id: "A2EUQ1WTGCTBG2", country_code: "CA", suffix: ".ca" },
    Market { code: "MEX", marketplace_id: "A1AM78C64UM0Y8", country_code: "MX", suffix: ".com.mx" },
    Market { code: "JPN", marketplace_id: "A1VC38T7YXB528", country_code: "JP", suffix: ".co.jp" },
    Market { code: "ARE", marketplace_id: "A2VIGQ35RCS4UG", country_code: "AE", suffix: ".me" },
    Market { code: "ITA", marketplace_id: "APJ6JRA9NG5V4", country_code: "IT", suffix: ".it" },
    Market { code: "DEU", marketplace_id: "A1PA6795UKMFR9", country_code: "DE", suffix: ".de" },
    Market { code: "FRA", marketplace_id: "A13V1IB3VIYZZH", country_code: "FR", suffix: ".fr" },
    Market { code: "ESP", marketplace_id: "A1RKKUPIHCS9HS", country_code: "ES", suffix: ".es" },
    Market { code: "NLD", marketplace_id: "A1805IZSGTT6HS", country_code: "NL", suffix: ".nl" },
    Market { code: "SWE", marketplace_id: "A2NODRKZP88ZB9", country_code: "SE", suffix: ".se" },
    Market { code: "POL", marketplace_id: "A1C3SOZRARQ6R3", country_code: "PL", suffix: ".pl" },
    Market { code: "GBR", marketplace_id: "A1F83G8C2ARO7P", country_code: "UK", suffix: ".co.uk" },
    Market { code: "SGP", marketplace_id: "A19VAU5U5O7RUS", country_code: "SG", suffix: ".com.sg" },
    Market { code: "AUS", marketplace_id: "A39IBJ37TRP1C6", country_code: "AU", suffix: ".com.au" },
];

impl Market {
    /// Looks a market up by its configuration code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        MARKETS
            .iter()
            .find(|m| m.code.eq_ignore_ascii_case(code))
            .copied()
    }

    /// The default market; the only one with geotarget verification
    pub fn usa() -> Self {
        MARKETS[0]
    }

    pub fn is_default(&self) -> bool {
        self.code == "USA"
    }

    /// Storefront origin, e.g. `https://www.amazon.co.uk`
    pub fn base_url(&self) -> String {
        format!("https://www.amazon{}", self.suffix)
    }
}
