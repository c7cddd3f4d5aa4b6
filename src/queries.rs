use crate::catalog::{Category, SubType};

/// One marketplace search the ingester runs each time.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: &'static str,
    pub category: Category,
    pub sub_type: SubType,
    pub label: &'static str,
}

const fn q(query: &'static str, category: Category, sub_type: SubType, label: &'static str) -> SearchQuery {
    SearchQuery {
        query,
        category,
        sub_type,
        label,
    }
}

/// Fixed search catalog, in run order.
pub const SEARCH_QUERIES: &[SearchQuery] = &[
    // Printers
    q("fdm 3d printer", Category::Printer, SubType::Fdm, "FDM printers"),
    q("core xy 3d printer", Category::Printer, SubType::Fdm, "CoreXY printers"),
    q("resin 3d printer msla", Category::Printer, SubType::ResinPrinter, "Resin printers"),
    // Filament
    q("pla filament 1.75mm", Category::Filament, SubType::Pla, "PLA filament"),
    q("petg filament 1.75mm", Category::Filament, SubType::Petg, "PETG filament"),
    q("abs filament 1.75mm", Category::Filament, SubType::Abs, "ABS filament"),
    q("tpu filament 1.75mm", Category::Filament, SubType::Tpu, "TPU filament"),
    q("asa filament 1.75mm", Category::Filament, SubType::Asa, "ASA filament"),
    q("nylon filament 1.75mm", Category::Filament, SubType::Nylon, "Nylon filament"),
    // Resin
    q("standard photopolymer resin 405nm", Category::Resin, SubType::StandardResin, "Standard resin"),
    q("water washable resin 3d printer", Category::Resin, SubType::WaterWashable, "Water-washable resin"),
    q("abs like resin 3d printer", Category::Resin, SubType::AbsLike, "ABS-like resin"),
    // Accessories
    q("3d printer nozzle set", Category::Accessory, SubType::Nozzle, "Nozzles"),
    q("pei build plate spring steel", Category::Accessory, SubType::BuildPlate, "Build plates"),
    q("3d printer enclosure", Category::Accessory, SubType::Enclosure, "Enclosures"),
    q("filament dryer box", Category::Accessory, SubType::Dryer, "Filament dryers"),
    q("3d print removal tool kit", Category::Accessory, SubType::Tools, "Tool kits"),
    // Pens
    q("3d printing pen", Category::Pen, SubType::Pen, "3D pens"),
];

/// Queries whose category is in `categories`; all of them when the filter is empty.
pub fn select(categories: &[Category]) -> Vec<SearchQuery> {
    SEARCH_QUERIES
        .iter()
        .filter(|sq| categories.is_empty() || categories.contains(&sq.category))
        .cloned()
        .collect()
}
