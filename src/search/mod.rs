//! Tantivy-based search index module.
//!
//! Full-text search over incident reports, with field boosting so a hit in the
//! description outranks a hit in the reporter's name.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Report;

const BOOST_DESCRIPTION: f32 = 10.0;
const BOOST_LOCATION: f32 = 7.0;
const BOOST_THREAT_TYPE: f32 = 5.5;
const BOOST_STATE: f32 = 4.0;
const BOOST_REPORTER: f32 = 2.0;

/// Deepest hit a page may reach; the collector buffers `limit + offset` hits.
pub const MAX_SEARCH_WINDOW: usize = 10_000;

/// Search hit with report id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub report_id: String,
    pub score: f32,
}

/// One page of hits plus the number of documents matching the query.
#[derive(Debug, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchResult>,
    pub total: usize,
}

struct SearchFields {
    report_id: Field,
    description: Field,
    location: Field,
    state: Field,
    threat_type: Field,
    reporter: Field,
}

/// Tantivy search index for reports.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // Indexed as a raw token so updates can delete by id
        let report_id = schema_builder.add_text_field("report_id", STRING | STORED);
        let description = schema_builder.add_text_field("description", TEXT);
        let location = schema_builder.add_text_field("location", TEXT);
        let state = schema_builder.add_text_field("state", TEXT);
        let threat_type = schema_builder.add_text_field("threat_type", TEXT);
        let reporter = schema_builder.add_text_field("reporter", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            report_id,
            description,
            location,
            state,
            threat_type,
            reporter,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000)
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the stored reports.
    pub async fn rebuild(&self, reports: &[Report]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for report in reports {
            writer.add_document(self.create_document(report))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} reports", reports.len());
        Ok(())
    }

    /// Index or re-index a single report.
    pub async fn index_report(&self, report: &Report) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.report_id, &report.id);
        writer.delete_term(term);
        writer.add_document(self.create_document(report))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    pub async fn remove_report(&self, report_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.report_id, report_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search reports; a blank query yields no hits.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, AppError> {
        if query_str.trim().is_empty() {
            return Ok(SearchPage::default());
        }

        let searcher = self.reader.searcher();

        let field_queries = [
            (self.fields.description, BOOST_DESCRIPTION),
            (self.fields.location, BOOST_LOCATION),
            (self.fields.threat_type, BOOST_THREAT_TYPE),
            (self.fields.state, BOOST_STATE),
            (self.fields.reporter, BOOST_REPORTER),
        ];

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let combined_query: Box<dyn tantivy::query::Query> = if subqueries.is_empty() {
            let parser = QueryParser::for_index(
                &self.index,
                field_queries.iter().map(|(field, _)| *field).collect(),
            );
            parser
                .parse_query(query_str)
                .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let window = limit.saturating_add(offset);
        if limit == 0 || window > MAX_SEARCH_WINDOW {
            let total = searcher
                .search(&combined_query, &Count)
                .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;
            return Ok(SearchPage {
                hits: Vec::new(),
                total,
            });
        }

        let (total, top_docs) = searcher
            .search(
                &combined_query,
                &(Count, TopDocs::with_limit(window)),
            )
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let hits = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let report_id = doc.get_first(self.fields.report_id)?.as_str()?.to_string();
                Some(SearchResult { report_id, score })
            })
            .collect();

        Ok(SearchPage { hits, total })
    }

    fn create_document(&self, report: &Report) -> TantivyDocument {
        let location = match &report.lga {
            Some(lga) => format!("{} {}", report.location, lga),
            None => report.location.clone(),
        };

        // Anonymous reports never carry reporter details into the index
        let reporter = if report.is_anonymous {
            String::new()
        } else {
            report.reporter_name.clone().unwrap_or_default()
        };

        doc!(
            self.fields.report_id => report.id.clone(),
            self.fields.description => report.description.clone(),
            self.fields.location => location,
            self.fields.state => report.state.clone(),
            self.fields.threat_type => report.threat_type.as_str().replace('_', " "),
            self.fields.reporter => reporter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, ReportStatus, ThreatType};
    use tempfile::TempDir;

    fn create_test_report(id: &str, description: &str, location: &str, threat: ThreatType) -> Report {
        Report {
            id: id.to_string(),
            description: description.to_string(),
            location: location.to_string(),
            state: "Kaduna".to_string(),
            lga: None,
            latitude: None,
            longitude: None,
            threat_type: threat,
            priority: Priority::High,
            status: ReportStatus::Pending,
            media_urls: Vec::new(),
            reporter_name: None,
            reporter_phone: None,
            reporter_email: None,
            is_anonymous: true,
            created_at: "2025-03-01T00:00:00.000000Z".to_string(),
            updated_at: "2025-03-01T00:00:00.000000Z".to_string(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_matching_report() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let reports = vec![
            create_test_report("1", "Gunmen blocked the highway near the toll gate", "Zaria road", ThreatType::Banditry),
            create_test_report("2", "Youths vandalised the transformer overnight", "Kawo", ThreatType::Vandalism),
        ];
        index.rebuild(&reports).await.unwrap();

        let page = index.search("highway", 10, 0).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].report_id, "1");

        let page = index.search("vandalism", 10, 0).unwrap();
        assert_eq!(page.hits[0].report_id, "2");
    }

    #[tokio::test]
    async fn test_reindex_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let mut report = create_test_report("r1", "Suspicious parcel at the market", "Central market", ThreatType::Other);
        index.index_report(&report).await.unwrap();
        assert_eq!(index.search("parcel", 10, 0).unwrap().hits.len(), 1);

        report.description = "Armed men seen at the market gate".to_string();
        index.index_report(&report).await.unwrap();
        assert!(index.search("parcel", 10, 0).unwrap().hits.is_empty());
        assert_eq!(index.search("armed", 10, 0).unwrap().hits.len(), 1);

        index.remove_report("r1").await.unwrap();
        assert!(index.search("armed", 10, 0).unwrap().hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        assert!(index.search("", 10, 0).unwrap().hits.is_empty());
        assert_eq!(index.search("   ", 10, 0).unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_search_paging_and_total() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let reports: Vec<Report> = (0..5)
            .map(|i| {
                create_test_report(
                    &format!("r{}", i),
                    "Gunmen sighted near the village",
                    "Birnin Gwari",
                    ThreatType::Banditry,
                )
            })
            .collect();
        index.rebuild(&reports).await.unwrap();

        let page = index.search("gunmen", 2, 4).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.hits.len(), 1);

        let page = index.search("gunmen", 0, 0).unwrap();
        assert_eq!(page.total, 5);
        assert!(page.hits.is_empty());

        let page = index.search("gunmen", 10, usize::MAX).unwrap();
        assert_eq!(page.total, 5);
        assert!(page.hits.is_empty());

        let page = index.search("gunmen", 10, MAX_SEARCH_WINDOW).unwrap();
        assert_eq!(page.total, 5);
        assert!(page.hits.is_empty());
    }
}
