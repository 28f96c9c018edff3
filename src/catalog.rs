//! Authoritative product catalogue.
//!
//! A static, code-defined catalogue is deliberate for this storefront: the
//! assortment is small and curated by the municipality, and keeping it in the
//! binary means pricing can never drift from what was reviewed. Prices are
//! integer cents, tax included. Client-submitted prices are never trusted;
//! every checkout re-reads this table.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    /// Stable slug used as the product id in carts and order lines.
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Unit price in cents, tax included.
    pub unit_price_cents: i64,
    /// Shipping contribution per unit, in cents (charged in delivery mode only).
    pub shipping_cents_per_unit: i64,
    pub image: &'static str,
    pub active: bool,
    pub weight_grams: Option<u32>,
    /// None means stock is not tracked for this product.
    pub stock_quantity: Option<i64>,
    pub tags: &'static [&'static str],
}

pub const CATALOGUE: &[Product] = &[
    Product {
        id: "mug-crest",
        name: "Town Crest Mug",
        description: "Premium ceramic mug with the embossed town crest. 350ml, dishwasher and microwave safe.",
        unit_price_cents: 1200,
        shipping_cents_per_unit: 450,
        image: "/images/products/mug-crest.jpg",
        active: true,
        weight_grams: Some(380),
        stock_quantity: Some(45),
        tags: &["tableware", "collection"],
    },
    Product {
        id: "tote-market-hall",
        name: "Market Hall Tote Bag",
        description: "Organic cotton tote with a vintage print of the 1885 market hall. 40x45cm, reinforced handles.",
        unit_price_cents: 1800,
        shipping_cents_per_unit: 450,
        image: "/images/products/tote-market-hall.jpg",
        active: true,
        weight_grams: Some(140),
        stock_quantity: Some(35),
        tags: &["textile", "best-seller"],
    },
    Product {
        id: "stickers-archive",
        name: "Archive Sticker Set",
        description: "Set of 8 holographic stickers drawn from the municipal archives. Water and UV resistant.",
        unit_price_cents: 700,
        shipping_cents_per_unit: 200,
        image: "/images/products/stickers-archive.jpg",
        active: true,
        weight_grams: Some(25),
        stock_quantity: Some(120),
        tags: &["stationery"],
    },
    Product {
        id: "notebook-1885",
        name: "1885 Edition Notebook",
        description: "A5 notebook with an embossed crest cover. 120g paper, 192 numbered pages.",
        unit_price_cents: 2200,
        shipping_cents_per_unit: 450,
        image: "/images/products/notebook-1885.jpg",
        active: true,
        weight_grams: Some(320),
        stock_quantity: Some(50),
        tags: &["stationery", "collection", "best-seller"],
    },
    Product {
        id: "pin-crest",
        name: "Crest Enamel Pin",
        description: "Hard-enamel pin with a polished finish and gold butterfly clutch. 3cm diameter.",
        unit_price_cents: 900,
        shipping_cents_per_unit: 200,
        image: "/images/products/pin-crest.jpg",
        active: true,
        weight_grams: Some(15),
        stock_quantity: Some(80),
        tags: &["accessories", "best-seller"],
    },
    Product {
        id: "poster-belfry",
        name: "Belfry Art Print",
        description: "Exclusive art print on 250g matte paper. A3 format, revisited vintage design.",
        unit_price_cents: 2500,
        shipping_cents_per_unit: 450,
        image: "/images/products/poster-belfry.jpg",
        active: true,
        weight_grams: Some(180),
        stock_quantity: Some(8),
        tags: &["decoration", "collection"],
    },
    Product {
        id: "bottle-ramparts",
        name: "Ramparts Steel Bottle",
        description: "Insulated 500ml stainless-steel bottle, laser-engraved. Keeps cold 24h, hot 12h.",
        unit_price_cents: 2800,
        shipping_cents_per_unit: 600,
        image: "/images/products/bottle-ramparts.jpg",
        active: true,
        weight_grams: Some(280),
        stock_quantity: Some(40),
        tags: &["tableware", "eco-friendly"],
    },
    // Retired design, kept for order-history snapshots.
    Product {
        id: "patch-centenary",
        name: "Centenary Woven Patch",
        description: "Woven iron-on patch from the centenary collection.",
        unit_price_cents: 600,
        shipping_cents_per_unit: 200,
        image: "/images/products/patch-centenary.jpg",
        active: false,
        weight_grams: Some(10),
        stock_quantity: Some(0),
        tags: &["accessories"],
    },
];

/// Looks up an *active* product by id. Inactive products are invisible to
/// carts and checkout even though historical order lines may reference them.
pub fn product_by_id(id: &str) -> Option<&'static Product> {
    CATALOGUE.iter().find(|p| p.id == id && p.active)
}

/// All products currently purchasable.
pub fn active_products() -> Vec<&'static Product> {
    CATALOGUE.iter().filter(|p| p.active).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_active_product() {
        let product = product_by_id("mug-crest").expect("mug should exist");
        assert_eq!(product.unit_price_cents, 1200);
        assert_eq!(product.shipping_cents_per_unit, 450);
    }

    #[test]
    fn lookup_hides_inactive_products() {
        assert!(product_by_id("patch-centenary").is_none());
        assert!(product_by_id("no-such-product").is_none());
    }

    #[test]
    fn active_listing_excludes_retired_designs() {
        let products = active_products();
        assert!(products.iter().all(|p| p.active));
        assert!(!products.iter().any(|p| p.id == "patch-centenary"));
    }
}
