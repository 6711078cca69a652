// Page-based storage
// Rows are grouped into fixed-capacity pages; a row ID encodes
// (page, slot) so lookups never search

use super::Row;

/// A fixed-capacity block of rows
#[derive(Debug, Clone)]
pub struct Page {
    pub id: usize,
    pub rows: Vec<Row>,
    /// Maximum number of rows per page
    pub max_rows: usize,
}

impl Page {
    pub fn new(id: usize, max_rows: usize) -> Self {
        Self {
            id,
            rows: Vec::with_capacity(max_rows),
            max_rows,
        }
    }

    /// Insert a row into the page
    /// Returns false if the page is full
    pub fn insert(&mut self, row: Row) -> bool {
        if self.is_full() {
            return false;
        }

        self.rows.push(row);
        true
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.max_rows
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Page Manager - owns every page of one table
/// Rows are append-only, so only the last page can have free slots
#[derive(Debug)]
pub struct PageManager {
    pages: Vec<Page>,
    max_rows_per_page: usize,
}

impl PageManager {
    pub fn new(max_rows_per_page: usize) -> Self {
        Self {
            pages: Vec::new(),
            max_rows_per_page: max_rows_per_page.max(1),
        }
    }

    /// Append a row, opening a new page when the last one is full
    /// Returns the row ID
    pub fn insert(&mut self, row: Row) -> usize {
        if let Some(page) = self.pages.last_mut() {
            if !page.is_full() {
                let row_id = page.id * self.max_rows_per_page + page.len();
                page.insert(row);
                return row_id;
            }
        }

        let page_id = self.pages.len();
        let mut page = Page::new(page_id, self.max_rows_per_page);
        page.insert(row);
        self.pages.push(page);

        page_id * self.max_rows_per_page
    }

    /// Get a row by global row ID
    /// Row ID format: page_id * max_rows_per_page + row_index
    pub fn get(&self, row_id: usize) -> Option<&Row> {
        let page_id = row_id / self.max_rows_per_page;
        let row_index = row_id % self.max_rows_per_page;

        self.pages.get(page_id)?.get(row_index)
    }

    /// Iterate all rows in insertion order, with their row IDs
    pub fn scan(&self) -> impl Iterator<Item = (usize, &Row)> + '_ {
        let per_page = self.max_rows_per_page;
        self.pages.iter().flat_map(move |page| {
            page.rows
                .iter()
                .enumerate()
                .map(move |(slot, row)| (page.id * per_page + slot, row))
        })
    }

    pub fn total_rows(&self) -> usize {
        self.pages.iter().map(|p| p.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    fn row(i: i64) -> Row {
        Row {
            values: vec![Value::Integer(i)],
        }
    }

    #[test]
    fn test_rows_spill_into_new_pages() {
        let mut pages = PageManager::new(2);
        let ids: Vec<usize> = (0..5).map(|i| pages.insert(row(i))).collect();

        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(pages.total_rows(), 5);
        assert_eq!(pages.get(3), Some(&row(3)));
        assert_eq!(pages.get(9), None);
    }

    #[test]
    fn test_scan_keeps_insertion_order() {
        let mut pages = PageManager::new(3);
        for i in 0..7 {
            pages.insert(row(i));
        }

        let seen: Vec<i64> = pages
            .scan()
            .map(|(_, r)| match r.values[0] {
                Value::Integer(i) => i,
                _ => -1,
            })
            .collect();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }
}
