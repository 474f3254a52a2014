//! Block Service - authoritative block CRUD
//!
//! Reads and writes blocks in the backing document store and assigns sibling
//! positions with [`FractionalIndex`]. Sibling order is the byte order of the
//! `position` field; every list returned here is already in that order and
//! callers must not re-sort it.
//!
//! Store failures propagate to the caller unchanged in meaning. Nothing here
//! retries; retry policy lives in the offline queue.

use crate::db::{BatchOp, Document, DocumentStore, Filter, FractionalIndex, SnapshotStream};
use crate::models::{
    Block, BlockUpdate, CreateBlockParams, DeleteResult, Operation, Page, PageUpdate,
};
use crate::services::error::BlockServiceError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

pub const BLOCKS_COLLECTION: &str = "blocks";
pub const PAGES_COLLECTION: &str = "pages";

const PAGE_ID_FIELD: &str = "pageId";
const PARENT_ID_FIELD: &str = "parentId";
const POSITION_FIELD: &str = "position";

/// Position-ordered block snapshots of a page
pub type BlockStream = Pin<Box<dyn Stream<Item = Vec<Block>> + Send>>;

/// Executes queued operations against the authoritative store
///
/// The offline queue only knows this trait, so replay can be pointed at a
/// real [`BlockService`] or at a scripted executor in tests.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, operation: &Operation) -> Result<(), BlockServiceError>;
}

/// Block CRUD, tree traversal and positioning over a [`DocumentStore`]
#[derive(Clone)]
pub struct BlockService {
    store: Arc<dyn DocumentStore>,
}

impl BlockService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a block
    ///
    /// Without an explicit position the block is appended after the current
    /// last sibling of `(page_id, parent_id)`. New blocks start at `version = 1`.
    pub async fn create(&self, params: CreateBlockParams) -> Result<Block, BlockServiceError> {
        let position = match params.position {
            Some(position) => {
                FractionalIndex::validate(&position)?;
                position
            }
            None => {
                let siblings = self
                    .list_by_parent(&params.page_id, params.parent_id.as_deref())
                    .await?;
                let last = siblings.last().map(|block| block.position.as_str());
                FractionalIndex::generate(last, None)?
            }
        };

        let id = params.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let block = Block::new_with_id(
            id,
            params.block_type,
            params.page_id,
            params.parent_id,
            position,
            params.content,
            params.user_id,
        )
        .with_properties(params.properties);

        self.write_block(&block).await?;
        tracing::debug!(
            block_id = %block.id,
            page_id = %block.page_id,
            position = %block.position,
            "Created block"
        );
        Ok(block)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Block>, BlockServiceError> {
        match self.store.get(BLOCKS_COLLECTION, id).await? {
            Some(doc) => Ok(Some(doc.into_record()?)),
            None => Ok(None),
        }
    }

    /// Every block of a page, ascending by position
    pub async fn list_by_page(&self, page_id: &str) -> Result<Vec<Block>, BlockServiceError> {
        let filters = [Filter::eq(PAGE_ID_FIELD, Value::from(page_id))];
        self.query_blocks(&filters).await
    }

    /// Children of `parent_id` (page-root blocks for `None`), ascending by position
    pub async fn list_by_parent(
        &self,
        page_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Block>, BlockServiceError> {
        let filters = [
            Filter::eq(PAGE_ID_FIELD, Value::from(page_id)),
            Filter::eq(PARENT_ID_FIELD, parent_id.map(Value::from).unwrap_or(Value::Null)),
        ];
        self.query_blocks(&filters).await
    }

    /// Top-level blocks of a page, ascending by position
    ///
    /// Blocks whose parent no longer exists (left behind by a non-cascading
    /// delete) are treated as roots.
    pub async fn list_roots(&self, page_id: &str) -> Result<Vec<Block>, BlockServiceError> {
        let blocks = self.list_by_page(page_id).await?;
        let ids: HashSet<&str> = blocks.iter().map(|block| block.id.as_str()).collect();
        let roots = blocks
            .iter()
            .filter(|block| match &block.parent_id {
                Some(parent_id) => !ids.contains(parent_id.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        Ok(roots)
    }

    /// Apply a partial update, bumping `version` and provenance
    ///
    /// Fails with `NotFound` when the block is gone and with `VersionConflict`
    /// when `update.expected_version` no longer matches.
    pub async fn update(
        &self,
        id: &str,
        update: BlockUpdate,
        user_id: &str,
    ) -> Result<Block, BlockServiceError> {
        let mut block = self
            .get(id)
            .await?
            .ok_or_else(|| BlockServiceError::not_found(id))?;

        if let Some(expected) = update.expected_version {
            if expected != block.version {
                return Err(BlockServiceError::version_conflict(id, expected, block.version));
            }
        }

        if update.is_empty() {
            tracing::debug!(block_id = %id, "Skipping empty block update");
            return Ok(block);
        }

        update.apply(&mut block, user_id);
        self.write_block(&block).await?;
        tracing::debug!(block_id = %id, version = block.version, "Updated block");
        Ok(block)
    }

    /// Delete a block, optionally with its whole subtree
    ///
    /// A cascading delete collects every descendant first and removes the
    /// subtree in one atomic batch. A plain delete leaves children pointing at
    /// a missing parent. Deleting a missing block is not an error.
    pub async fn delete(&self, id: &str, cascade: bool) -> Result<DeleteResult, BlockServiceError> {
        let Some(block) = self.get(id).await? else {
            tracing::debug!(block_id = %id, "Delete of missing block ignored");
            return Ok(DeleteResult::not_found());
        };

        if !cascade {
            self.store.delete(BLOCKS_COLLECTION, id).await?;
            return Ok(DeleteResult::deleted(1));
        }

        let ids = self.collect_subtree(&block).await?;
        let count = ids.len();
        let ops = ids
            .into_iter()
            .map(|block_id| BatchOp::delete(BLOCKS_COLLECTION, block_id))
            .collect();
        self.store.atomic_batch(ops).await?;

        tracing::debug!(block_id = %id, deleted = count, "Cascade deleted block subtree");
        Ok(DeleteResult::deleted(count))
    }

    /// Move a block under `new_parent_id`, between two siblings
    ///
    /// `before_id` names the sibling that will precede the block, `after_id`
    /// the one that will follow it. When both are given they must be adjacent.
    /// A missing side is resolved to the actual adjacent sibling; with neither
    /// given the block goes to the end. The new parent must be on the same page.
    pub async fn move_block(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        before_id: Option<&str>,
        after_id: Option<&str>,
        user_id: &str,
    ) -> Result<Block, BlockServiceError> {
        let mut block = self
            .get(id)
            .await?
            .ok_or_else(|| BlockServiceError::not_found(id))?;

        if let Some(parent_id) = new_parent_id {
            let parent = self
                .get(parent_id)
                .await?
                .ok_or_else(|| BlockServiceError::not_found(parent_id))?;
            if parent.page_id != block.page_id {
                return Err(BlockServiceError::invalid_payload(format!(
                    "Parent {} belongs to page {}, block {} to page {}",
                    parent_id, parent.page_id, id, block.page_id
                )));
            }
            if self.collect_subtree(&block).await?.iter().any(|d| d == parent_id) {
                return Err(BlockServiceError::invalid_payload(format!(
                    "Block {} cannot move under its own subtree",
                    id
                )));
            }
        }

        let siblings: Vec<Block> = self
            .list_by_parent(&block.page_id, new_parent_id)
            .await?
            .into_iter()
            .filter(|sibling| sibling.id != id)
            .collect();

        let before_index = self.neighbor_index(&siblings, before_id).await?;
        let after_index = self.neighbor_index(&siblings, after_id).await?;

        let (lower, upper) = match (before_index, after_index) {
            (Some(b), Some(a)) => {
                // a gap with a live sibling in it would hand out that sibling's key
                if a != b + 1 {
                    return Err(BlockServiceError::invalid_payload(format!(
                        "Blocks {} and {} are not adjacent siblings",
                        before_id.unwrap_or_default(),
                        after_id.unwrap_or_default()
                    )));
                }
                (Some(b), Some(a))
            }
            (Some(b), None) => (Some(b), (b + 1 < siblings.len()).then_some(b + 1)),
            (None, Some(a)) => (a.checked_sub(1), Some(a)),
            (None, None) => (siblings.len().checked_sub(1), None),
        };

        let position = FractionalIndex::generate(
            lower.map(|i| siblings[i].position.as_str()),
            upper.map(|i| siblings[i].position.as_str()),
        )?;

        block.parent_id = new_parent_id.map(str::to_string);
        block.position = position;
        block.version += 1;
        block.updated_at = Utc::now();
        block.updated_by = user_id.to_string();
        self.write_block(&block).await?;

        tracing::debug!(
            block_id = %id,
            parent_id = ?new_parent_id,
            position = %block.position,
            "Moved block"
        );
        Ok(block)
    }

    /// Write many blocks in one all-or-nothing batch
    pub async fn bulk_create(&self, blocks: Vec<Block>) -> Result<Vec<String>, BlockServiceError> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(blocks.len());
        let mut ops = Vec::with_capacity(blocks.len());
        for block in &blocks {
            FractionalIndex::validate(&block.position)?;
            ops.push(BatchOp::put(
                BLOCKS_COLLECTION,
                Document::from_record(block.id.clone(), block)?,
            ));
            ids.push(block.id.clone());
        }

        self.store.atomic_batch(ops).await?;
        tracing::debug!(count = ids.len(), "Bulk created blocks");
        Ok(ids)
    }

    /// Merge `update` into a page document
    pub async fn update_page(
        &self,
        page_id: &str,
        update: PageUpdate,
        user_id: &str,
    ) -> Result<(), BlockServiceError> {
        if self.store.get(PAGES_COLLECTION, page_id).await?.is_none() {
            return Err(BlockServiceError::not_found(page_id));
        }

        let mut fields = match serde_json::to_value(&update) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                return Err(BlockServiceError::invalid_payload(format!(
                    "page update must be an object, got {}",
                    other
                )))
            }
            Err(e) => return Err(BlockServiceError::invalid_payload(e.to_string())),
        };
        fields.retain(|_, value| !value.is_null());
        fields.insert("updatedAt".to_string(), Value::from(Utc::now().to_rfc3339()));
        fields.insert("updatedBy".to_string(), Value::from(user_id));

        self.store.put(PAGES_COLLECTION, page_id, fields, true).await?;
        tracing::debug!(page_id = %page_id, "Updated page");
        Ok(())
    }

    /// Write a page document, replacing any existing one
    pub async fn put_page(&self, page: &Page) -> Result<(), BlockServiceError> {
        let doc = Document::from_record(page.id.clone(), page)?;
        self.store
            .put(PAGES_COLLECTION, &page.id, doc.fields, false)
            .await?;
        Ok(())
    }

    pub async fn get_page(&self, page_id: &str) -> Result<Option<Page>, BlockServiceError> {
        match self.store.get(PAGES_COLLECTION, page_id).await? {
            Some(doc) => Ok(Some(doc.into_record()?)),
            None => Ok(None),
        }
    }

    /// Live, position-ordered block lists of a page
    ///
    /// The first item is the current list. Documents that fail to decode are
    /// skipped with a warning.
    pub fn subscribe_page(&self, page_id: &str) -> BlockStream {
        let filters = vec![Filter::eq(PAGE_ID_FIELD, Value::from(page_id))];
        let snapshots: SnapshotStream = self.store.subscribe(BLOCKS_COLLECTION, filters);
        Box::pin(snapshots.map(decode_ordered))
    }

    async fn write_block(&self, block: &Block) -> Result<(), BlockServiceError> {
        let doc = Document::from_record(block.id.clone(), block)?;
        self.store
            .put(BLOCKS_COLLECTION, &block.id, doc.fields, false)
            .await?;
        Ok(())
    }

    async fn query_blocks(&self, filters: &[Filter]) -> Result<Vec<Block>, BlockServiceError> {
        let docs = self
            .store
            .query(BLOCKS_COLLECTION, filters, Some(POSITION_FIELD))
            .await?;
        docs.into_iter()
            .map(|doc| doc.into_record().map_err(BlockServiceError::from))
            .collect()
    }

    /// Ids of `root` and all of its descendants
    async fn collect_subtree(&self, root: &Block) -> Result<Vec<String>, BlockServiceError> {
        let mut ids = vec![root.id.clone()];
        let mut seen: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut pending = vec![root.id.clone()];

        while let Some(parent_id) = pending.pop() {
            for child in self.list_by_parent(&root.page_id, Some(&parent_id)).await? {
                if seen.insert(child.id.clone()) {
                    ids.push(child.id.clone());
                    pending.push(child.id);
                }
            }
        }
        Ok(ids)
    }

    /// Index of `neighbor_id` among `siblings`; the block must exist and be one of them
    async fn neighbor_index(
        &self,
        siblings: &[Block],
        neighbor_id: Option<&str>,
    ) -> Result<Option<usize>, BlockServiceError> {
        let Some(neighbor_id) = neighbor_id else {
            return Ok(None);
        };
        if let Some(index) = siblings.iter().position(|s| s.id == neighbor_id) {
            return Ok(Some(index));
        }
        match self.get(neighbor_id).await? {
            Some(_) => Err(BlockServiceError::invalid_payload(format!(
                "Block {} is not a sibling at the target location",
                neighbor_id
            ))),
            None => Err(BlockServiceError::not_found(neighbor_id)),
        }
    }
}

fn decode_ordered(docs: Vec<Document>) -> Vec<Block> {
    let mut blocks: Vec<Block> = docs
        .into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match doc.into_record::<Block>() {
                Ok(block) => Some(block),
                Err(e) => {
                    tracing::warn!(block_id = %id, "Skipping undecodable block: {}", e);
                    None
                }
            }
        })
        .collect();
    blocks.sort_by(|a, b| FractionalIndex::compare(&a.position, &b.position));
    blocks
}

#[async_trait]
impl OperationExecutor for BlockService {
    async fn execute(&self, operation: &Operation) -> Result<(), BlockServiceError> {
        match operation {
            Operation::Create(params) => {
                // a replayed create whose earlier write landed is already applied
                if let Some(id) = params.id.as_deref() {
                    if self.get(id).await?.is_some() {
                        tracing::debug!(block_id = %id, "Block already exists, create skipped");
                        return Ok(());
                    }
                }
                self.create(params.clone()).await.map(|_| ())
            }
            Operation::Update {
                block_id,
                update,
                user_id,
            } => self.update(block_id, update.clone(), user_id).await.map(|_| ()),
            Operation::Delete { block_id, cascade } => {
                self.delete(block_id, *cascade).await.map(|_| ())
            }
            Operation::PageUpdate {
                page_id,
                update,
                user_id,
            } => self.update_page(page_id, update.clone(), user_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryDocumentStore, StoreError};
    use crate::models::{BlockType, RichTextNode};
    use tokio::time::{timeout, Duration};

    fn setup() -> (BlockService, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        (BlockService::new(store.clone()), store)
    }

    fn params(page_id: &str, text: &str) -> CreateBlockParams {
        CreateBlockParams::new(
            BlockType::Paragraph,
            page_id,
            "user-1",
            RichTextNode::from_plain(text),
        )
    }

    #[tokio::test]
    async fn test_create_appends_after_last_sibling() {
        let (service, _) = setup();
        let first = service.create(params("page-1", "one")).await.unwrap();
        let second = service.create(params("page-1", "two")).await.unwrap();

        assert_eq!(first.position, "a0");
        assert!(second.position > first.position);
        assert_eq!(second.version, 1);
        assert_eq!(second.plain_text, "two");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_position() {
        let (service, _) = setup();
        let err = service
            .create(params("page-1", "x").with_position("a-0"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlockServiceError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_list_by_parent_scopes_to_parent() {
        let (service, _) = setup();
        let root = service.create(params("page-1", "root")).await.unwrap();
        service
            .create(params("page-1", "child").with_parent(root.id.clone()))
            .await
            .unwrap();

        let roots = service.list_by_parent("page-1", None).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);

        let children = service
            .list_by_parent("page-1", Some(&root.id))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].parent_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(service.list_by_page("page-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_plain_text() {
        let (service, _) = setup();
        let block = service.create(params("page-1", "before")).await.unwrap();

        let updated = service
            .update(
                &block.id,
                BlockUpdate::new().with_content(RichTextNode::from_plain("after")),
                "user-2",
            )
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.plain_text, "after");
        assert_eq!(updated.updated_by, "user-2");
        assert_eq!(updated.created_by, "user-1");
    }

    #[tokio::test]
    async fn test_update_version_conflict() {
        let (service, _) = setup();
        let block = service.create(params("page-1", "x")).await.unwrap();

        let err = service
            .update(
                &block.id,
                BlockUpdate::new()
                    .with_content(RichTextNode::from_plain("y"))
                    .with_expected_version(5),
                "user-1",
            )
            .await
            .unwrap_err();
        assert_eq!(err, BlockServiceError::version_conflict(&block.id, 5, 1));
    }

    #[tokio::test]
    async fn test_update_missing_block() {
        let (service, _) = setup();
        let err = service
            .update("missing", BlockUpdate::new(), "user-1")
            .await
            .unwrap_err();
        assert_eq!(err, BlockServiceError::not_found("missing"));
    }

    #[tokio::test]
    async fn test_non_cascading_delete_orphans_children() {
        let (service, _) = setup();
        let parent = service.create(params("page-1", "parent")).await.unwrap();
        let child = service
            .create(params("page-1", "child").with_parent(parent.id.clone()))
            .await
            .unwrap();

        let result = service.delete(&parent.id, false).await.unwrap();
        assert_eq!(result, DeleteResult::deleted(1));

        let roots = service.list_roots("page-1").await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, child.id);
    }

    #[tokio::test]
    async fn test_move_between_siblings() {
        let (service, _) = setup();
        let a = service.create(params("page-1", "a")).await.unwrap();
        let b = service.create(params("page-1", "b")).await.unwrap();
        let c = service.create(params("page-1", "c")).await.unwrap();

        let moved = service
            .move_block(&c.id, None, Some(&a.id), None, "user-2")
            .await
            .unwrap();
        assert!(moved.position > a.position && moved.position < b.position);
        assert_eq!(moved.updated_by, "user-2");
        assert_eq!(moved.version, 2);

        let order: Vec<_> = service
            .list_by_parent("page-1", None)
            .await
            .unwrap()
            .into_iter()
            .map(|block| block.id)
            .collect();
        assert_eq!(order, vec![a.id, c.id, b.id]);
    }

    #[tokio::test]
    async fn test_move_between_non_adjacent_siblings_rejected() {
        let (service, _) = setup();
        let a = service.create(params("page-1", "a")).await.unwrap();
        let b = service.create(params("page-1", "b")).await.unwrap();
        let c = service.create(params("page-1", "c")).await.unwrap();
        let d = service.create(params("page-1", "d")).await.unwrap();

        let err = service
            .move_block(&d.id, None, Some(&a.id), Some(&c.id), "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BlockServiceError::InvalidPayload(_)));

        let err = service
            .move_block(&d.id, None, Some(&b.id), Some(&a.id), "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BlockServiceError::InvalidPayload(_)));

        let unchanged = service.get(&d.id).await.unwrap().unwrap();
        assert_eq!(unchanged.position, d.position);

        let moved = service
            .move_block(&d.id, None, Some(&a.id), Some(&b.id), "user-1")
            .await
            .unwrap();
        let positions: Vec<_> = service
            .list_by_parent("page-1", None)
            .await
            .unwrap()
            .into_iter()
            .map(|block| block.position)
            .collect();
        assert_eq!(positions.len(), 4);
        let mut distinct = positions.clone();
        distinct.dedup();
        assert_eq!(distinct, positions);
        assert!(moved.position > a.position && moved.position < b.position);
    }

    #[tokio::test]
    async fn test_move_under_parent_on_other_page_rejected() {
        let (service, _) = setup();
        let block = service.create(params("page-1", "a")).await.unwrap();
        let foreign = service.create(params("page-2", "b")).await.unwrap();

        let err = service
            .move_block(&block.id, Some(&foreign.id), None, None, "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BlockServiceError::InvalidPayload(_)));

        let unchanged = service.get(&block.id).await.unwrap().unwrap();
        assert_eq!(unchanged.parent_id, None);
        assert_eq!(unchanged.version, 1);
    }

    #[tokio::test]
    async fn test_replayed_create_is_applied_once() {
        let (service, _) = setup();
        let operation = Operation::Create(params("page-1", "once").with_id("block-1"));

        service.execute(&operation).await.unwrap();
        service.execute(&operation).await.unwrap();

        let blocks = service.list_by_page("page-1").await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "block-1");
        assert_eq!(blocks[0].position, "a0");
    }

    #[tokio::test]
    async fn test_move_to_front_and_into_parent() {
        let (service, _) = setup();
        let a = service.create(params("page-1", "a")).await.unwrap();
        let b = service.create(params("page-1", "b")).await.unwrap();

        let moved = service
            .move_block(&b.id, None, None, Some(&a.id), "user-1")
            .await
            .unwrap();
        assert!(moved.position < a.position);

        let nested = service
            .move_block(&b.id, Some(&a.id), None, None, "user-1")
            .await
            .unwrap();
        assert_eq!(nested.parent_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(nested.position, "a0");
    }

    #[tokio::test]
    async fn test_move_missing_neighbor() {
        let (service, _) = setup();
        let a = service.create(params("page-1", "a")).await.unwrap();
        let err = service
            .move_block(&a.id, None, Some("ghost"), None, "user-1")
            .await
            .unwrap_err();
        assert_eq!(err, BlockServiceError::not_found("ghost"));
    }

    #[tokio::test]
    async fn test_update_page_merges_fields() {
        let (service, _) = setup();
        service
            .put_page(&Page::new("page-1", "ws-1", "Draft", "user-1"))
            .await
            .unwrap();

        service
            .update_page("page-1", PageUpdate::default().with_title("Final"), "user-2")
            .await
            .unwrap();

        let page = service.get_page("page-1").await.unwrap().unwrap();
        assert_eq!(page.title, "Final");
        assert_eq!(page.workspace_id, "ws-1");
        assert_eq!(page.updated_by, "user-2");

        let err = service
            .update_page("missing", PageUpdate::default(), "user-1")
            .await
            .unwrap_err();
        assert_eq!(err, BlockServiceError::not_found("missing"));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let (service, store) = setup();
        store.fail_next(StoreError::PermissionDenied("rules".to_string()));
        let err = service.create(params("page-1", "x")).await.unwrap_err();
        assert!(matches!(err, BlockServiceError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_subscribe_page_yields_ordered_snapshots() {
        let (service, _) = setup();
        let first = service.create(params("page-1", "first")).await.unwrap();
        let mut stream = service.subscribe_page("page-1");

        let initial = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(initial.len(), 1);

        service
            .create(params("page-1", "zero").with_position("Z"))
            .await
            .unwrap();
        let next = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].position, "Z");
        assert_eq!(next[1].id, first.id);
    }
}
