// Constants for crawling the CAZy website
//
// Site
pub const CAZY_HOME: &str = "http://www.cazy.org";

// Class index: anchors carrying this class link to the class pages
pub const CLASS_LINK_SELECTOR: &str = "a.spip_out";
pub const CLASS_DENYLIST: [&str; 1] = ["Genomes"];

// Family index
pub const DIRECT_ACCESS_HEADING: &str = "Tables for Direct Access";
pub const FAMILY_HREF_PATTERN: &str = r"^(?P<name>[A-Z]+\d+)\.html$";
pub const SUBFAMILY_HREF_PATTERN: &str = r"^(?P<name>[A-Za-z]+\d+_\d+)\.html$";

// Listing pages
pub const LISTING_TABLE_SELECTOR: &str = "table.listing";
pub const KINGDOM_ROW_CLASS: &str = "royaume";
pub const KINGDOM_ROW_NAVIGATION: &str = "Top";
pub const LAST_PAGE_SELECTOR: &str = "a.lastpage";
pub const OFFSET_PARAMETER: &str = "debut_PRINC";
pub const PAGINATION_ANCHOR: &str = "#pagination_PRINC";
pub const WINDOW_SIZE: usize = 1000;
pub const ROW_CELLS: usize = 6;
pub const NO_EC_NUMBER: &str = "N/A";

// Large download heuristic
pub const LARGE_CLASS_COUNT: usize = 2;
pub const LARGE_FAMILY_COUNT: usize = 5;
pub const THROTTLED_INTERVAL_MS: u64 = 1000;

// Defaults
pub const DEFAULT_RETRIES: u32 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;
pub const USER_AGENT: &str = "cazy-harvest/0.1";

/// (code, class page stem, accepted synonyms)
pub const CLASSES: [(&str, &str, &[&str]); 6] = [
    ("GH", "Glycoside-Hydrolases", &["Glycoside Hydrolases", "Glycoside-Hydrolases", "Glycoside Hydrolases (GHs)", "GHs"]),
    ("GT", "GlycosylTransferases", &["GlycosylTransferases", "Glycosyl Transferases", "Glycosyltransferases", "GlycosylTransferases (GTs)", "GTs"]),
    ("PL", "Polysaccharide-Lyases", &["Polysaccharide Lyases", "Polysaccharide-Lyases", "Polysaccharide Lyases (PLs)", "PLs"]),
    ("CE", "Carbohydrate-Esterases", &["Carbohydrate Esterases", "Carbohydrate-Esterases", "Carbohydrate Esterases (CEs)", "CEs"]),
    ("AA", "Auxiliary-Activities", &["Auxiliary Activities", "Auxiliary-Activities", "Auxiliary Activities (AAs)", "AAs"]),
    ("CBM", "Carbohydrate-Binding-Modules", &["Carbohydrate Binding Modules", "Carbohydrate-Binding-Modules", "Carbohydrate-Binding Modules (CBMs)", "CBMs"]),
];
