//! Document command handlers

use std::collections::HashMap;

use syncspace_core::{DocumentError, DocumentMetadata};
use syncspace_model::DocumentId;
use syncspace_proto::v1 as pb;

use crate::backend::{Backend, WorldView};
use crate::error::CommandError;
use crate::handlers::parse_id;

pub fn create_document(
    backend: &Backend,
    req: pb::CreateDocumentRequest,
) -> Result<pb::CreateDocumentResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;

    let title = req.metadata.get("title").cloned().unwrap_or_default();
    let (document_id, version) =
        view.documents.create(&space_id, &title, &req.data, req.metadata)?;

    Ok(pb::CreateDocumentResponse { document_id: document_id.to_hex(), version })
}

pub fn get_document(
    backend: &Backend,
    req: pb::GetDocumentRequest,
) -> Result<pb::GetDocumentResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;
    let document_id = parse_id(&req.document_id, "document id")?;

    match view.documents.get(&space_id, &document_id) {
        Ok(content) => Ok(pb::GetDocumentResponse {
            found: true,
            document: Some(document_info(content.meta, content.data, content.version)),
        }),
        // Absent document is a negative lookup, not an error.
        Err(DocumentError::NotFound(_)) => {
            Ok(pb::GetDocumentResponse { found: false, document: None })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn update_document(
    backend: &Backend,
    req: pb::UpdateDocumentRequest,
) -> Result<pb::UpdateDocumentResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;
    let document_id = parse_id(&req.document_id, "document id")?;

    // An empty metadata map means "leave the stored metadata alone".
    let metadata = if req.metadata.is_empty() { None } else { Some(req.metadata) };

    let version = view
        .documents
        .update(&space_id, &document_id, &req.data, metadata)?;
    Ok(pb::UpdateDocumentResponse { version })
}

pub fn delete_document(
    backend: &Backend,
    req: pb::DeleteDocumentRequest,
) -> Result<pb::DeleteDocumentResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;
    let document_id = parse_id(&req.document_id, "document id")?;

    // The engine errors on a missing document; at the RPC boundary that is
    // reported as existed=false instead.
    view.spaces.get(&space_id)?;
    if !view.documents.exists(&space_id, &document_id) {
        return Ok(pb::DeleteDocumentResponse { existed: false });
    }

    view.documents.delete(&space_id, &document_id)?;
    Ok(pb::DeleteDocumentResponse { existed: true })
}

pub fn list_documents(
    backend: &Backend,
    req: pb::ListDocumentsRequest,
) -> Result<pb::ListDocumentsResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;

    let docs = view.documents.list(&space_id)?;
    let (documents, next_cursor) = paginate(&view, docs, req.limit)?;
    Ok(pb::ListDocumentsResponse { documents, next_cursor })
}

pub fn query_documents(
    backend: &Backend,
    req: pb::QueryDocumentsRequest,
) -> Result<pb::QueryDocumentsResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;

    // Only `tags contains <value>` is supported; other filter tuples are
    // ignored in this iteration.
    let tags: Vec<String> = req
        .filters
        .iter()
        .filter(|f| f.field == "tags" && f.op == "contains")
        .map(|f| f.value.clone())
        .collect();

    let docs = view.documents.query(&space_id, &tags)?;
    let (documents, next_cursor) = paginate(&view, docs, req.limit)?;
    Ok(pb::QueryDocumentsResponse { documents, next_cursor })
}

/// Sort by document id for a stable order, apply the limit, and report the
/// id just past the cut as the next cursor.
fn paginate(
    view: &WorldView,
    mut docs: Vec<DocumentMetadata>,
    limit: u32,
) -> Result<(Vec<pb::DocumentInfo>, String), CommandError> {
    docs.sort_by_key(|d| d.document_id);

    let versions: HashMap<DocumentId, u64> = if docs.is_empty() {
        HashMap::new()
    } else {
        view.documents.versions(&docs[0].space_id)?
    };

    let mut next_cursor = String::new();
    if limit > 0 && docs.len() > limit as usize {
        next_cursor = docs[limit as usize].document_id.to_hex();
        docs.truncate(limit as usize);
    }

    let documents = docs
        .into_iter()
        .map(|meta| {
            let version = versions.get(&meta.document_id).copied().unwrap_or(0);
            // Listings carry metadata only; payloads come from GetDocument.
            document_info(meta, Vec::new(), version)
        })
        .collect();

    Ok((documents, next_cursor))
}

fn document_info(meta: DocumentMetadata, data: Vec<u8>, version: u64) -> pb::DocumentInfo {
    pb::DocumentInfo {
        document_id: meta.document_id.to_hex(),
        space_id: meta.space_id.to_hex(),
        data,
        title: meta.title,
        tags: meta.tags,
        metadata: meta.metadata,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
        version,
    }
}
