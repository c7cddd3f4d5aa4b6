/// Known brands, matched in this order. Longer names that contain a shorter
/// one come first so "Bambu Lab" is not shadowed.
pub const BRANDS: &[&str] = &[
    "Bambu Lab",
    "Creality",
    "Prusa",
    "Anycubic",
    "Elegoo",
    "Flashforge",
    "Sovol",
    "Artillery",
    "Qidi",
    "Voxelab",
    "Phrozen",
    "Snapmaker",
    "Kingroon",
    "Geeetech",
    "Polymaker",
    "Hatchbox",
    "Overture",
    "Sunlu",
    "eSun",
    "Eryone",
    "Inland",
    "Siraya Tech",
    "Jayo",
    "3Doodler",
    "MYNT3D",
    "Scribit",
    "Micro Swiss",
    "Capricorn",
];

/// First known brand whose name occurs in `title`, ignoring case.
pub fn resolve(title: &str) -> Option<&'static str> {
    let lower = title.to_lowercase();
    BRANDS
        .iter()
        .find(|b| lower.contains(&b.to_lowercase()))
        .copied()
}
