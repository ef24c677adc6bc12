use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query-string parameters shared by every listing endpoint.
///
/// Everything arrives as text so that garbage like `?page=abc` falls back to
/// the defaults instead of rejecting the request.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub search: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    pub important_first: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.page_size))
    }
}

impl PageQuery {
    pub fn page_request(&self) -> PageRequest {
        let page = parse_leading_int(self.page.as_deref()).unwrap_or(DEFAULT_PAGE);
        let page_size = parse_leading_int(self.page_size.as_deref()).unwrap_or(DEFAULT_PAGE_SIZE);
        PageRequest::new(page, page_size)
    }

    /// The substring to match; empty matches everything.
    pub fn search_term(&self) -> &str {
        self.search.as_deref().unwrap_or("")
    }

    pub fn sort_order(&self) -> SortOrder {
        match self.sort_order.as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn sort_field(&self) -> &str {
        self.sort_field.as_deref().unwrap_or("createdAt")
    }

    pub fn important_first(&self) -> bool {
        self.important_first.as_deref() == Some("true")
    }
}

/// Reads the leading decimal digits of a query value (`"3"`, `" 3px"`).
/// Zero, negatives and non-numeric input yield `None`.
fn parse_leading_int(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim_start();
    let end = raw
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..end].parse::<u32>().ok().filter(|n| *n > 0)
}

/// A page of results serialized as
/// `{ page, pageSize, total, totalPages, <items_key>: [...] }`.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items_key: &'static str,
    pub page: PageRequest,
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(items_key: &'static str, page: PageRequest, total: u64, items: Vec<T>) -> Self {
        Self {
            items_key,
            page,
            total,
            items,
        }
    }
}

impl<T: Serialize> Serialize for Paginated<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("page", &self.page.page)?;
        map.serialize_entry("pageSize", &self.page.page_size)?;
        map.serialize_entry("total", &self.total)?;
        map.serialize_entry("totalPages", &self.page.total_pages(self.total))?;
        map.serialize_entry(self.items_key, &self.items)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, page_size: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
            page_size: page_size.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_when_missing_or_invalid() {
        assert_eq!(query(None, None).page_request(), PageRequest::new(1, 10));
        assert_eq!(query(Some("abc"), Some("")).page_request(), PageRequest::new(1, 10));
        assert_eq!(query(Some("0"), Some("-5")).page_request(), PageRequest::new(1, 10));
    }

    #[test]
    fn parses_leading_digits() {
        assert_eq!(query(Some("3"), Some("25")).page_request(), PageRequest::new(3, 25));
        assert_eq!(query(Some("2nd"), Some(" 7 ")).page_request(), PageRequest::new(2, 7));
    }

    #[test]
    fn page_size_is_capped() {
        assert_eq!(query(None, Some("5000")).page_request().page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn offset_and_total_pages() {
        let page = PageRequest::new(3, 10);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
        assert_eq!(page.total_pages(30), 3);
    }

    #[test]
    fn sort_order_is_desc_unless_asc() {
        let mut q = PageQuery::default();
        assert_eq!(q.sort_order(), SortOrder::Desc);
        q.sort_order = Some("asc".into());
        assert_eq!(q.sort_order(), SortOrder::Asc);
        q.sort_order = Some("ASC".into());
        assert_eq!(q.sort_order(), SortOrder::Desc);
    }

    #[test]
    fn paginated_uses_resource_key() {
        let page = Paginated::new("fonts", PageRequest::new(2, 2), 5, vec!["a", "b"]);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["pageSize"], 2);
        assert_eq!(json["total"], 5);
        assert_eq!(json["totalPages"], 3);
        assert_eq!(json["fonts"], serde_json::json!(["a", "b"]));
    }
}
