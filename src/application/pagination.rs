//! Offset pagination shared by every list endpoint.

use serde::Serialize;

/// Largest page size any endpoint will serve.
pub const MAX_PAGE_SIZE: u32 = 100;

pub const DEFAULT_POST_PAGE_SIZE: u32 = 10;
pub const DEFAULT_COMMENT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_FAVORITE_PAGE_SIZE: u32 = 12;
pub const DEFAULT_NOTIFICATION_PAGE_SIZE: u32 = 20;

/// Sanitized 1-based page selection. Construct through [`PageParams::new`]
/// so out-of-range input falls back to the resource default instead of
/// erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    page: u32,
    size: u32,
}

impl PageParams {
    pub fn new(page: Option<u32>, size: Option<u32>, default_size: u32) -> Self {
        let page = match page {
            Some(value) if value >= 1 => value,
            _ => 1,
        };
        let size = match size {
            Some(value) if (1..=MAX_PAGE_SIZE).contains(&value) => value,
            _ => default_size,
        };
        Self { page, size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

/// List response envelope: `{data, total, page, size}`.
#[derive(Debug, Clone, Serialize)]
pub struct PageData<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl<T> PageData<T> {
    pub fn new(data: Vec<T>, total: u64, params: PageParams) -> Self {
        Self {
            data,
            total,
            page: params.page(),
            size: params.size(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageData<U> {
        PageData {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}
