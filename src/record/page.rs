use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::record::{PageId, RecordId, SlotId, Tuple};
use super::schema::TupleDesc;
use crate::concurrency::TransactionId;

/// Capabilities the buffer pool needs from any page variant
pub trait Page {
    /// Table-wide parameters needed to decode a page
    type Layout;

    fn decode(id: PageId, data: &[u8], layout: &Self::Layout) -> RecordResult<Self>
    where
        Self: Sized;

    fn encode(&self) -> RecordResult<Vec<u8>>;

    fn id(&self) -> PageId;

    /// Transaction that last dirtied this page, or `None` when clean
    fn is_dirty(&self) -> Option<TransactionId>;

    fn mark_dirty(&mut self, dirty: bool, tid: TransactionId);
}

/// Slot geometry shared by every page of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    desc: Arc<TupleDesc>,
    page_size: usize,
    slot_count: usize,
    header_size: usize,
}

impl PageLayout {
    pub fn new(desc: Arc<TupleDesc>, page_size: usize) -> RecordResult<Self> {
        let record_size = desc.record_size();
        let slot_count = Self::calculate_slot_count(record_size, page_size);
        if slot_count == 0 {
            return Err(RecordError::SchemaMismatch(format!(
                "Record size {} does not fit a {} byte page",
                record_size, page_size
            )));
        }

        Ok(Self {
            desc,
            page_size,
            slot_count,
            header_size: slot_count.div_ceil(8),
        })
    }

    /// Calculate maximum number of slots for a given record size
    pub fn calculate_slot_count(record_size: usize, page_size: usize) -> usize {
        if record_size == 0 || record_size > page_size {
            return 0;
        }

        // Every slot costs its record bytes plus one bitmap bit
        (page_size * 8) / (record_size * 8 + 1)
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn record_size(&self) -> usize {
        self.desc.record_size()
    }

    /// Bytes of a freshly allocated page: every slot free
    pub fn empty_page_data(&self) -> Vec<u8> {
        vec![0u8; self.page_size]
    }

    fn slot_offset(&self, slot_id: SlotId) -> usize {
        self.header_size + slot_id * self.record_size()
    }
}

/// In-memory image of one slotted heap page
///
/// Layout on disk: `header_size` bytes of occupancy bitmap (slot 0 is the
/// least-significant bit of byte 0), then `slot_count` fixed-width slots,
/// then zero padding up to the page size.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    layout: Arc<PageLayout>,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Get the number of slots in this page
    pub fn slot_count(&self) -> usize {
        self.layout.slot_count
    }

    pub fn layout(&self) -> &Arc<PageLayout> {
        &self.layout
    }

    /// Check if a slot is used
    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        if slot_id >= self.layout.slot_count {
            return false;
        }
        (self.header[slot_id / 8] & (1 << (slot_id % 8))) != 0
    }

    fn set_slot_used(&mut self, slot_id: SlotId, used: bool) {
        let mask = 1 << (slot_id % 8);
        if used {
            self.header[slot_id / 8] |= mask;
        } else {
            self.header[slot_id / 8] &= !mask;
        }
    }

    /// Find the lowest-numbered free slot, returns None if page is full
    pub fn find_free_slot(&self) -> Option<SlotId> {
        (0..self.layout.slot_count).find(|&slot_id| !self.is_slot_used(slot_id))
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.layout.slot_count)
            .filter(|&slot_id| !self.is_slot_used(slot_id))
            .count()
    }

    pub fn is_full(&self) -> bool {
        self.find_free_slot().is_none()
    }

    /// Tuple stored in an occupied slot
    pub fn tuple(&self, slot_id: SlotId) -> Option<&Tuple> {
        if !self.is_slot_used(slot_id) {
            return None;
        }
        self.tuples[slot_id].as_ref()
    }

    /// Occupied tuples in increasing slot order, each carrying its record id
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        (0..self.layout.slot_count).filter_map(move |slot_id| self.tuple(slot_id))
    }

    /// Store `tuple` in the lowest free slot
    ///
    /// Does not mark the page dirty; callers do that once the change is final.
    pub fn insert(&mut self, mut tuple: Tuple) -> RecordResult<RecordId> {
        if !tuple.desc().is_compatible(self.layout.desc()) {
            return Err(RecordError::SchemaMismatch(format!(
                "Tuple ({}) does not match page layout ({})",
                tuple.desc(),
                self.layout.desc()
            )));
        }

        let slot_id = self
            .find_free_slot()
            .ok_or(RecordError::PageFull(self.pid))?;

        let rid = RecordId::new(self.pid, slot_id);
        tuple.set_record_id(Some(rid));
        self.tuples[slot_id] = Some(tuple);
        self.set_slot_used(slot_id, true);
        Ok(rid)
    }

    /// Free the slot named by `rid`; the bitmap bit is authoritative
    pub fn delete(&mut self, rid: RecordId) -> RecordResult<()> {
        if rid.page_id != self.pid || !self.is_slot_used(rid.slot_id) {
            return Err(RecordError::TupleNotFound(rid));
        }

        self.set_slot_used(rid.slot_id, false);
        self.tuples[rid.slot_id] = None;
        Ok(())
    }
}

impl Page for HeapPage {
    type Layout = Arc<PageLayout>;

    fn decode(id: PageId, data: &[u8], layout: &Arc<PageLayout>) -> RecordResult<Self> {
        if data.len() != layout.page_size {
            return Err(RecordError::CorruptPage {
                expected: layout.page_size,
                actual: data.len(),
            });
        }

        let mut page = Self {
            pid: id,
            layout: Arc::clone(layout),
            header: data[..layout.header_size].to_vec(),
            tuples: vec![None; layout.slot_count],
            dirtier: None,
        };

        let record_size = layout.record_size();
        for slot_id in 0..layout.slot_count {
            if !page.is_slot_used(slot_id) {
                continue;
            }
            let start = layout.slot_offset(slot_id);
            let mut tuple = Tuple::deserialize(&data[start..start + record_size], layout.desc())?;
            tuple.set_record_id(Some(RecordId::new(id, slot_id)));
            page.tuples[slot_id] = Some(tuple);
        }

        Ok(page)
    }

    fn encode(&self) -> RecordResult<Vec<u8>> {
        let record_size = self.layout.record_size();
        let mut data = Vec::with_capacity(self.layout.page_size);
        data.extend_from_slice(&self.header);

        for slot_id in 0..self.layout.slot_count {
            match self.tuple(slot_id) {
                Some(tuple) => tuple.serialize_into(&mut data)?,
                None => data.resize(data.len() + record_size, 0),
            }
        }

        data.resize(self.layout.page_size, 0);
        Ok(data)
    }

    fn id(&self) -> PageId {
        self.pid
    }

    fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtier
    }

    fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirtier = if dirty { Some(tid) } else { None };
    }
}

impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
            && self.layout == other.layout
            && self.header == other.header
            && self.iter().eq(other.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnDef, DataType, Value};

    const PAGE_SIZE: usize = 4096;

    fn create_test_layout() -> Arc<PageLayout> {
        let desc = TupleDesc::new(vec![
            ColumnDef::new("a", DataType::Int),
            ColumnDef::new("b", DataType::Char(12)),
        ]);
        Arc::new(PageLayout::new(Arc::new(desc), PAGE_SIZE).unwrap())
    }

    fn empty_page(layout: &Arc<PageLayout>) -> HeapPage {
        HeapPage::decode(PageId::new(1, 0), &layout.empty_page_data(), layout).unwrap()
    }

    fn tuple(layout: &PageLayout, i: i32) -> Tuple {
        Tuple::new(
            Arc::clone(layout.desc()),
            vec![Value::Int(i), Value::String(format!("row{}", i))],
        )
        .unwrap()
    }

    #[test]
    fn test_calculate_slot_count() {
        // 20-byte records on a 4096-byte page
        assert_eq!(PageLayout::calculate_slot_count(20, 4096), 203);
        assert_eq!(PageLayout::calculate_slot_count(4, 4096), 992);
        assert_eq!(PageLayout::calculate_slot_count(0, 4096), 0);
        assert_eq!(PageLayout::calculate_slot_count(5000, 4096), 0);
    }

    #[test]
    fn test_layout_fits_page() {
        let layout = create_test_layout();
        assert_eq!(layout.record_size(), 20);
        assert_eq!(layout.slot_count(), 203);
        assert_eq!(layout.header_size(), 26);
        assert!(layout.header_size() + layout.slot_count() * layout.record_size() <= PAGE_SIZE);
    }

    #[test]
    fn test_layout_rejects_oversized_tuple() {
        let desc = Arc::new(TupleDesc::from_types([DataType::Char(100)]));
        assert!(matches!(
            PageLayout::new(desc, 64),
            Err(RecordError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_empty_page() {
        let layout = create_test_layout();
        let page = empty_page(&layout);
        assert_eq!(page.num_empty_slots(), page.slot_count());
        assert_eq!(page.iter().count(), 0);
        assert_eq!(page.is_dirty(), None);
    }

    #[test]
    fn test_decode_wrong_size() {
        let layout = create_test_layout();
        let result = HeapPage::decode(PageId::new(1, 0), &[0u8; 100], &layout);
        assert!(matches!(
            result,
            Err(RecordError::CorruptPage {
                expected: PAGE_SIZE,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_insert_uses_lowest_free_slot() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);

        for i in 0..10 {
            let rid = page.insert(tuple(&layout, i)).unwrap();
            assert_eq!(rid.slot_id, i as usize);
        }
        assert_eq!(page.num_empty_slots(), page.slot_count() - 10);

        page.delete(RecordId::new(page.id(), 5)).unwrap();
        assert!(!page.is_slot_used(5));
        let rid = page.insert(tuple(&layout, 99)).unwrap();
        assert_eq!(rid, RecordId::new(page.id(), 5));
        assert_eq!(page.tuple(5).unwrap().get(0), Some(&Value::Int(99)));
    }

    #[test]
    fn test_insert_sets_record_id() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        page.insert(tuple(&layout, 1)).unwrap();
        page.insert(tuple(&layout, 2)).unwrap();

        let rids: Vec<_> = page.iter().map(|t| t.record_id().unwrap()).collect();
        assert_eq!(
            rids,
            vec![RecordId::new(page.id(), 0), RecordId::new(page.id(), 1)]
        );
    }

    #[test]
    fn test_page_full() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        for i in 0..page.slot_count() {
            assert!(!page.is_full());
            page.insert(tuple(&layout, i as i32)).unwrap();
        }
        assert!(page.is_full());
        assert!(matches!(
            page.insert(tuple(&layout, -1)),
            Err(RecordError::PageFull(pid)) if pid == page.id()
        ));
    }

    #[test]
    fn test_insert_wrong_schema() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        let other = Arc::new(TupleDesc::from_types([DataType::Int]));
        let t = Tuple::new(other, vec![Value::Int(1)]).unwrap();
        assert!(matches!(page.insert(t), Err(RecordError::SchemaMismatch(_))));
    }

    #[test]
    fn test_delete_missing() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        page.insert(tuple(&layout, 1)).unwrap();

        let free_slot = RecordId::new(page.id(), 3);
        assert!(matches!(
            page.delete(free_slot),
            Err(RecordError::TupleNotFound(_))
        ));
        let other_page = RecordId::new(PageId::new(1, 7), 0);
        assert!(matches!(
            page.delete(other_page),
            Err(RecordError::TupleNotFound(_))
        ));
        let past_end = RecordId::new(page.id(), 10_000);
        assert!(page.delete(past_end).is_err());
    }

    #[test]
    fn test_encode_layout() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        page.insert(tuple(&layout, 7)).unwrap();
        page.insert(tuple(&layout, 8)).unwrap();
        page.delete(RecordId::new(page.id(), 0)).unwrap();

        let data = page.encode().unwrap();
        assert_eq!(data.len(), PAGE_SIZE);
        assert_eq!(data[0], 0b0000_0010);
        // Freed slot is written as zeros
        assert!(data[26..46].iter().all(|&b| b == 0));
        assert_eq!(&data[46..50], &8i32.to_le_bytes());
    }

    #[test]
    fn test_round_trip_after_mutations() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        for i in 0..40 {
            page.insert(tuple(&layout, i)).unwrap();
        }
        for slot in [0, 3, 17, 39] {
            page.delete(RecordId::new(page.id(), slot)).unwrap();
        }
        page.insert(tuple(&layout, 100)).unwrap();
        page.mark_dirty(true, TransactionId::new());

        let decoded = HeapPage::decode(page.id(), &page.encode().unwrap(), &layout).unwrap();
        assert_eq!(decoded, page);
        assert_eq!(decoded.is_dirty(), None);
        assert_eq!(decoded.iter().count(), 37);
    }

    #[test]
    fn test_mark_dirty() {
        let layout = create_test_layout();
        let mut page = empty_page(&layout);
        let tid = TransactionId::new();
        page.mark_dirty(true, tid);
        assert_eq!(page.is_dirty(), Some(tid));
        page.mark_dirty(false, tid);
        assert_eq!(page.is_dirty(), None);
    }
}
