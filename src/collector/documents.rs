//! Retained example documents for the live view
//!
//! Documents are stored in the exact shape the service expects so a snapshot
//! can be serialized without another conversion pass. Retention is FIFO up
//! to the window cap; once full, further documents are dropped silently,
//! which preserves the earliest events in a burst.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One retained example event, discriminated by kind on the wire
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "__type")]
pub enum Document {
    #[serde(rename = "RequestTelemetryDocument")]
    Request(RequestDocument),
    #[serde(rename = "DependencyTelemetryDocument")]
    Dependency(DependencyDocument),
    #[serde(rename = "ExceptionTelemetryDocument")]
    Exception(ExceptionDocument),
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestDocument {
    #[serde(rename = "DocumentType")]
    pub document_type: &'static str,
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "OperationId")]
    pub operation_id: Option<String>,
    #[serde(rename = "Properties")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Success")]
    pub success: bool,
    /// ISO-8601 rendering of the request duration
    #[serde(rename = "Duration")]
    pub duration: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "OperationName")]
    pub operation_name: Option<String>,
    #[serde(rename = "Url")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyDocument {
    #[serde(rename = "DocumentType")]
    pub document_type: &'static str,
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "OperationId")]
    pub operation_id: Option<String>,
    #[serde(rename = "Properties")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Target")]
    pub target: Option<String>,
    #[serde(rename = "Success")]
    pub success: bool,
    /// ISO-8601 rendering of the call duration
    #[serde(rename = "Duration")]
    pub duration: String,
    #[serde(rename = "ResultCode")]
    pub result_code: Option<String>,
    #[serde(rename = "CommandName")]
    pub command_name: Option<String>,
    #[serde(rename = "DependencyTypeName")]
    pub dependency_type_name: Option<String>,
    #[serde(rename = "OperationName")]
    pub operation_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptionDocument {
    #[serde(rename = "DocumentType")]
    pub document_type: &'static str,
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "OperationId")]
    pub operation_id: Option<String>,
    #[serde(rename = "Properties")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(rename = "Exception")]
    pub exception: String,
    #[serde(rename = "ExceptionMessage")]
    pub exception_message: Option<String>,
    #[serde(rename = "ExceptionType")]
    pub exception_type: Option<String>,
}

/// Bounded FIFO buffer of retained documents
///
/// Concurrent appends from producer threads are allowed; order across
/// producers is unspecified.
#[derive(Debug)]
pub struct DocumentBuffer {
    capacity: usize,
    documents: Mutex<Vec<Document>>,
}

impl DocumentBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            documents: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Document>> {
        match self.documents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append the built document if the window cap allows
    ///
    /// The builder only runs when there is room, so a full buffer costs no
    /// allocation. Returns whether the document was retained.
    pub fn offer_with(&self, build: impl FnOnce() -> Document) -> bool {
        let mut documents = self.lock();
        if documents.len() >= self.capacity {
            return false;
        }
        documents.push(build());
        true
    }

    /// Take all retained documents, leaving the buffer empty
    #[must_use]
    pub fn drain(&self) -> Vec<Document> {
        std::mem::take(&mut *self.lock())
    }

    /// Copy the retained documents without resetting the window
    #[must_use]
    pub fn snapshot(&self) -> Vec<Document> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exception_document() -> Document {
        Document::Exception(ExceptionDocument {
            document_type: "Exception",
            version: "1.0",
            operation_id: None,
            properties: None,
            exception: String::new(),
            exception_message: Some("boom".to_string()),
            exception_type: Some("TestError".to_string()),
        })
    }

    #[test]
    fn test_capacity_enforced() {
        let buffer = DocumentBuffer::new(3);
        let mut built = 0;
        for _ in 0..5 {
            buffer.offer_with(|| {
                built += 1;
                exception_document()
            });
        }
        assert_eq!(buffer.len(), 3);
        // Builder never ran for the dropped documents
        assert_eq!(built, 3);
    }

    #[test]
    fn test_drain_resets() {
        let buffer = DocumentBuffer::new(10);
        buffer.offer_with(exception_document);
        buffer.offer_with(exception_document);
        assert_eq!(buffer.drain().len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_contents() {
        let buffer = DocumentBuffer::new(10);
        buffer.offer_with(exception_document);
        assert_eq!(buffer.snapshot().len(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_wire_discriminator() {
        let json = serde_json::to_string(&exception_document()).unwrap();
        assert!(json.starts_with("{\"__type\":\"ExceptionTelemetryDocument\""));
        assert!(json.contains("\"DocumentType\":\"Exception\""));
        assert!(json.contains("\"ExceptionMessage\":\"boom\""));
    }
}
