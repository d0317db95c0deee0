use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::options::ClientOptions;
use mongodb::{
    Client, Collection, Database as MongoDatabase,
    bson::{DateTime, Document, doc, oid::ObjectId},
};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;

use crate::config::CONFIG;
use crate::data_models::{MentionCount, MentionDoc, Page, PageDoc, date_to_bson, domain_of};
use crate::store::{MentionStore, PageId};

/// Collection names as constants for consistency
pub mod collections {
    pub const PAGES: &str = "pages";
    pub const MENTIONS: &str = "mentions";
}

/// Main database wrapper providing connection management and collection access
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: MongoDatabase,
}

impl Database {
    /// Create a new Database instance with custom URI and database name.
    /// Useful for testing with a different database.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;

        log::info!("Connected to MongoDB database: {}", db_name);

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Create a Database instance using environment configuration.
    /// Returns `None` when no `MONGO_URI` is configured.
    pub async fn from_config() -> Result<Option<Self>> {
        match CONFIG.mongo_uri.as_deref() {
            Some(uri) => Ok(Some(Self::new(uri, &CONFIG.mongo_db_name).await?)),
            None => Ok(None),
        }
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    /// Get the underlying MongoDB client (for advanced operations)
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn pages(&self) -> Collection<PageDoc> {
        self.collection(collections::PAGES)
    }

    pub fn mentions(&self) -> Collection<MentionDoc> {
        self.collection(collections::MENTIONS)
    }
}

// =============================================================================
// Generic CRUD operations
// =============================================================================

pub struct Repository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    /// Insert a single document
    pub async fn insert(&self, doc: &T) -> Result<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .context("Failed to insert document")?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get inserted ObjectId"))
    }

    /// Find a single document matching a filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document")
    }

    /// Find all documents matching a filter
    pub async fn find(&self, filter: Document) -> Result<Vec<T>> {
        use futures::TryStreamExt;

        let cursor = self
            .collection
            .find(filter)
            .await
            .context("Failed to execute find query")?;

        cursor
            .try_collect()
            .await
            .context("Failed to collect results")
    }

    /// Update a document by ObjectId
    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> Result<bool> {
        let filter = doc! { "_id": id };
        let result = self
            .collection
            .update_one(filter, doc! { "$set": update })
            .await
            .context("Failed to update document")?;

        Ok(result.modified_count > 0)
    }
}

// =============================================================================
// Page-specific operations
// =============================================================================

pub struct PageRepo {
    repo: Repository<PageDoc>,
}

impl PageRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.pages()),
        }
    }

    /// Inserts the page, or fills in whatever the stored copy is missing and
    /// bumps its last-seen time.
    pub async fn upsert(
        &self,
        url: &str,
        title: &str,
        text: &str,
        published: Option<NaiveDate>,
    ) -> Result<ObjectId> {
        if let Some(existing) = self.find_by_url(url).await? {
            let mut update = doc! { "last_seen_at": DateTime::now() };
            if existing.title.is_empty() && !title.is_empty() {
                update.insert("title", title);
            }
            if existing.text.is_empty() && !text.is_empty() {
                update.insert("text", text);
            }
            if existing.domain.is_empty() {
                update.insert("domain", domain_of(url));
            }
            if let (None, Some(date)) = (existing.published_at, published) {
                update.insert("published_at", date_to_bson(date));
            }
            self.repo.update_by_id(existing.id, update).await?;
            // Return the existing document's ID since this was an update
            Ok(existing.id)
        } else {
            let page = PageDoc::new(url.to_string(), title.to_string(), text.to_string(), published);
            self.repo.insert(&page).await
        }
    }

    /// Find by URL
    pub async fn find_by_url(&self, url: &str) -> Result<Option<PageDoc>> {
        self.repo.find_one(doc! { "url": url }).await
    }

    /// Pages among `ids`, optionally restricted to domains containing
    /// `domain_filter` (case-insensitive).
    pub async fn find_by_ids(
        &self,
        ids: Vec<ObjectId>,
        domain_filter: Option<&str>,
    ) -> Result<Vec<PageDoc>> {
        let mut filter = doc! { "_id": { "$in": ids } };
        if let Some(domain) = domain_filter {
            filter.insert(
                "domain",
                doc! { "$regex": regex::escape(domain), "$options": "i" },
            );
        }
        self.repo.find(filter).await
    }
}

// =============================================================================
// Mention-specific operations
// =============================================================================

pub struct MentionRepo {
    repo: Repository<MentionDoc>,
}

impl MentionRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.mentions()),
        }
    }

    /// One document per (page, term); re-recording overwrites the count.
    pub async fn upsert(&self, page_id: ObjectId, term: &str, count: u64) -> Result<()> {
        self.repo
            .collection
            .update_one(
                doc! { "page_id": page_id, "term": term },
                doc! { "$set": { "count": count as i64 } },
            )
            .upsert(true)
            .await
            .context("failed to upsert mention")?;
        Ok(())
    }

    pub async fn find_by_terms(&self, terms: &[String]) -> Result<Vec<MentionDoc>> {
        let filter = if terms.is_empty() {
            doc! {}
        } else {
            doc! { "term": { "$in": terms.to_vec() } }
        };
        self.repo.find(filter).await
    }
}

/// [`MentionStore`] backed by the `pages` and `mentions` collections.
pub struct MongoMentionStore {
    pages: PageRepo,
    mentions: MentionRepo,
}

impl MongoMentionStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pages: PageRepo::new(db),
            mentions: MentionRepo::new(db),
        }
    }
}

#[async_trait]
impl MentionStore for MongoMentionStore {
    async fn upsert_page(
        &self,
        url: &str,
        title: &str,
        text: &str,
        published: Option<NaiveDate>,
    ) -> Result<PageId> {
        let id = self.pages.upsert(url, title, text, published).await?;
        Ok(id.to_hex())
    }

    async fn record_mentions(&self, page_id: &PageId, mentions: &MentionCount) -> Result<()> {
        let page_id = ObjectId::parse_str(page_id)
            .with_context(|| format!("invalid page id: {page_id}"))?;
        for m in mentions.iter().filter(|m| m.count > 0) {
            self.mentions.upsert(page_id, &m.term, m.count).await?;
        }
        Ok(())
    }

    async fn find_pages(
        &self,
        terms: &[String],
        domain_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Page>> {
        let mention_docs = self.mentions.find_by_terms(terms).await?;

        let mut order: Vec<ObjectId> = Vec::new();
        let mut per_page: HashMap<ObjectId, MentionCount> = HashMap::new();
        for m in mention_docs {
            per_page
                .entry(m.page_id)
                .or_insert_with(|| {
                    order.push(m.page_id);
                    MentionCount::default()
                })
                .push(m.term, m.count.max(0) as u64);
        }
        if order.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.pages.find_by_ids(order.clone(), domain_filter).await?;
        let mut by_id: HashMap<ObjectId, PageDoc> = docs.into_iter().map(|d| (d.id, d)).collect();

        let mut pages: Vec<Page> = order
            .into_iter()
            .filter_map(|id| {
                let doc = by_id.remove(&id)?;
                let mentions = per_page.remove(&id)?;
                let published = doc.published();
                Some(Page::new(
                    doc.url,
                    doc.title,
                    String::new(),
                    doc.text,
                    published,
                    mentions,
                ))
            })
            .collect();
        pages.sort_by(|a, b| b.total_mentions().cmp(&a.total_mentions()));
        if let Some(limit) = limit {
            pages.truncate(limit);
        }
        Ok(pages)
    }
}

// =============================================================================
// Test utilities
// =============================================================================
