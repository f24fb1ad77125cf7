use std::sync::Arc;

use bytes::BufMut;

use crate::catalog::TableSchema;
use crate::common::codec::{get_u16, get_u32};
use crate::common::{
    PageId, Result, TableId, TabulaError, Timestamp, PAGE_HEADER_SIZE, SLOT_SIZE,
};
use crate::record::{PrimaryKey, Record};

/// A fixed-capacity page of records kept in primary-key order.
///
/// In memory a page is a plain vector of records; the slotted layout below
/// only exists on disk.
///
/// ## Page Layout
///
/// ```text
/// +------------------+
/// | entry count: u32 |
/// +------------------+
/// | Slot Array       |  one (offset: u16, length: u16) per record
/// | [slot 0]         |
/// | ...              |
/// +------------------+
/// | Free Space       |
/// +------------------+
/// | Record Data      |  packed from the end of the page
/// | [record n-1]     |
/// | ...              |
/// | [record 0]       |
/// +------------------+
/// ```
#[derive(Debug, Clone)]
pub struct Page {
    table_id: TableId,
    page_id: PageId,
    capacity: usize,
    free_bytes: usize,
    records: Vec<Record>,
    touched_at: Timestamp,
}

impl Page {
    /// Creates an empty page of `capacity` bytes.
    pub fn new(table_id: TableId, page_id: PageId, capacity: usize) -> Self {
        Self {
            table_id,
            page_id,
            capacity,
            free_bytes: capacity.saturating_sub(PAGE_HEADER_SIZE),
            records: Vec::new(),
            touched_at: 0,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub(crate) fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available for records and their slots.
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Timestamp of the last buffer pool access.
    pub fn touched_at(&self) -> Timestamp {
        self.touched_at
    }

    pub(crate) fn touch(&mut self, timestamp: Timestamp) {
        self.touched_at = timestamp;
    }

    pub fn first_key(&self) -> Option<PrimaryKey> {
        self.records.first().map(Record::primary_key)
    }

    pub fn last_key(&self) -> Option<PrimaryKey> {
        self.records.last().map(Record::primary_key)
    }

    /// Returns true if the record and its slot fit with room to spare.
    pub fn can_insert(&self, record: &Record) -> bool {
        self.free_bytes > record.size() + SLOT_SIZE
    }

    /// Inserts a record at `index`, which must keep the page in key order.
    ///
    /// Fails with `PageOverfull` and leaves the page untouched when the
    /// record does not fit.
    pub fn insert(&mut self, record: Record, index: usize) -> Result<()> {
        if !self.can_insert(&record) {
            return Err(self.overfull(record.size()));
        }
        debug_assert!(index <= self.records.len());

        self.free_bytes -= record.size() + SLOT_SIZE;
        self.records.insert(index.min(self.records.len()), record);
        Ok(())
    }

    /// Removes and returns the record at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Record> {
        if index >= self.records.len() {
            return Err(self.missing_slot(index));
        }
        let record = self.records.remove(index);
        self.free_bytes += record.size() + SLOT_SIZE;
        Ok(record)
    }

    /// Replaces the record at `index` in place.
    pub fn update(&mut self, index: usize, record: Record) -> Result<()> {
        let old_size = match self.records.get(index) {
            Some(old) => old.size(),
            None => return Err(self.missing_slot(index)),
        };

        let available = self.free_bytes + old_size;
        if record.size() > available {
            return Err(TabulaError::PageOverfull {
                record_size: record.size(),
                available,
            });
        }

        self.free_bytes = available - record.size();
        self.records[index] = record;
        Ok(())
    }

    /// Returns the position of the record with the given key.
    pub fn find_by_key(&self, key: &PrimaryKey) -> Option<usize> {
        self.records
            .binary_search_by(|record| record.primary_key().cmp(key))
            .ok()
    }

    /// Returns the position at which a record with `key` keeps the page ordered.
    pub fn insertion_index(&self, key: &PrimaryKey) -> usize {
        match self
            .records
            .binary_search_by(|record| record.primary_key().cmp(key))
        {
            Ok(index) | Err(index) => index,
        }
    }

    /// Inserts `record` at `index` into a full page by splitting it in two.
    ///
    /// The combined records are split at `ceil(n / 2)`: this page keeps the
    /// lower half and the upper half is returned as a new page with id
    /// `new_page_id`. Nothing changes if either half would not fit.
    pub fn split_insert(
        &mut self,
        record: Record,
        index: usize,
        new_page_id: PageId,
    ) -> Result<Page> {
        let record_size = record.size();
        let mut combined = self.records.clone();
        combined.insert(index.min(combined.len()), record);

        let mid = combined.len().div_ceil(2);
        let right_records = combined.split_off(mid);

        let fits = |records: &[Record]| self.used_bytes(records) <= self.capacity;
        if !fits(&combined) || !fits(&right_records) {
            return Err(self.overfull(record_size));
        }

        let mut right = Page::new(self.table_id, new_page_id, self.capacity);
        right.free_bytes = self.capacity - self.used_bytes(&right_records);
        right.records = right_records;

        self.free_bytes = self.capacity - self.used_bytes(&combined);
        self.records = combined;

        Ok(right)
    }

    /// Serializes the page to exactly `capacity` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.capacity];
        let mut slots = Vec::with_capacity(self.records.len());

        // Step 1: Pack record data from the end of the page
        let mut end = self.capacity;
        for record in &self.records {
            let bytes = record.to_bytes();
            let offset = end - bytes.len();
            data[offset..end].copy_from_slice(&bytes);
            slots.push((offset as u16, bytes.len() as u16));
            end = offset;
        }

        // Step 2: Write the header and the slot array
        let mut header = &mut data[..PAGE_HEADER_SIZE + slots.len() * SLOT_SIZE];
        header.put_u32_le(slots.len() as u32);
        for (offset, length) in slots {
            header.put_u16_le(offset);
            header.put_u16_le(length);
        }

        data
    }

    /// Deserializes a page written by [`Page::to_bytes`]. The page capacity
    /// is the length of `data`.
    pub fn from_bytes(schema: &Arc<TableSchema>, page_id: PageId, data: &[u8]) -> Result<Page> {
        let corrupted = |msg: String| {
            TabulaError::PageCorrupted(format!(
                "page {} of table {}: {}",
                page_id,
                schema.name(),
                msg
            ))
        };

        let capacity = data.len();
        let mut header = data;
        let count = get_u32(&mut header).ok_or_else(|| corrupted("missing header".into()))?
            as usize;
        if PAGE_HEADER_SIZE + count * SLOT_SIZE > capacity {
            return Err(corrupted(format!("{} slots do not fit", count)));
        }

        let mut page = Page::new(schema.table_id(), page_id, capacity);
        for slot in 0..count {
            let (offset, length) = get_u16(&mut header)
                .zip(get_u16(&mut header))
                .ok_or_else(|| corrupted(format!("truncated slot {}", slot)))?;
            let (offset, length) = (offset as usize, length as usize);
            if offset + length > capacity {
                return Err(corrupted(format!("slot {} points past the page", slot)));
            }

            let record = Record::from_bytes(Arc::clone(schema), &data[offset..offset + length])?;
            if let Some(last) = page.last_key() {
                if record.primary_key() <= last {
                    return Err(corrupted(format!("slot {} is out of key order", slot)));
                }
            }
            page.free_bytes = page
                .free_bytes
                .checked_sub(record.size() + SLOT_SIZE)
                .ok_or_else(|| corrupted("records exceed capacity".into()))?;
            page.records.push(record);
        }

        Ok(page)
    }

    fn used_bytes(&self, records: &[Record]) -> usize {
        PAGE_HEADER_SIZE
            + records
                .iter()
                .map(|record| record.size() + SLOT_SIZE)
                .sum::<usize>()
    }

    fn overfull(&self, record_size: usize) -> TabulaError {
        TabulaError::PageOverfull {
            record_size,
            available: self.free_bytes.saturating_sub(SLOT_SIZE),
        }
    }

    fn missing_slot(&self, index: usize) -> TabulaError {
        TabulaError::KeyNotFound(format!(
            "no record at position {} of page {}",
            index, self.page_id
        ))
    }
}
