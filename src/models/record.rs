/// Placeholder for a field the model did not provide
pub const NULL_FIELD: &str = "NULL";

/// Field names in output order
pub const FIELD_NAMES: [&str; 6] = [
    "headline",
    "overview",
    "category",
    "tags",
    "stance",
    "timestamp",
];

/// Column header of the per-transcript CSV
pub const OUTPUT_HEADER: [&str; 7] = [
    "id",
    "headline",
    "overview",
    "category",
    "tags",
    "stance",
    "timestamp",
];

/// The six-field summary extracted from one model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRecord {
    pub headline: String,
    pub overview: String,
    pub category: String,
    pub tags: String,
    pub stance: String,
    pub timestamp: String,
}

impl Default for StructuredRecord {
    fn default() -> Self {
        Self {
            headline: NULL_FIELD.to_string(),
            overview: NULL_FIELD.to_string(),
            category: NULL_FIELD.to_string(),
            tags: NULL_FIELD.to_string(),
            stance: NULL_FIELD.to_string(),
            timestamp: NULL_FIELD.to_string(),
        }
    }
}

impl StructuredRecord {
    /// Build from fields in `FIELD_NAMES` order
    pub fn from_fields(fields: [String; 6]) -> Self {
        let [headline, overview, category, tags, stance, timestamp] = fields;
        Self {
            headline,
            overview,
            category,
            tags,
            stance,
            timestamp,
        }
    }

    /// Fields in `FIELD_NAMES` order
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.headline,
            &self.overview,
            &self.category,
            &self.tags,
            &self.stance,
            &self.timestamp,
        ]
    }

    /// Mutable access to a field by its (lowercase) name
    pub fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "headline" => Some(&mut self.headline),
            "overview" => Some(&mut self.overview),
            "category" => Some(&mut self.category),
            "tags" => Some(&mut self.tags),
            "stance" => Some(&mut self.stance),
            "timestamp" => Some(&mut self.timestamp),
            _ => None,
        }
    }

    /// A record without a headline or an overview carries no usable summary
    pub fn is_empty_extraction(&self) -> bool {
        self.headline == NULL_FIELD || self.overview == NULL_FIELD
    }
}

/// One CSV row: a record tagged with the transcript it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub id: String,
    pub record: StructuredRecord,
}

impl OutputRow {
    pub fn new(id: impl Into<String>, record: StructuredRecord) -> Self {
        Self {
            id: id.into(),
            record,
        }
    }

    /// Fields in `OUTPUT_HEADER` order
    pub fn csv_fields(&self) -> [&str; 7] {
        let [headline, overview, category, tags, stance, timestamp] = self.record.fields();
        [&self.id, headline, overview, category, tags, stance, timestamp]
    }
}
