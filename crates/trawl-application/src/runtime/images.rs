//! Image-section processing.

use trawl_domain::entities::{Document, IndexingDocument, ProcessedSection, Section};
use trawl_domain::ports::VisionProvider;

/// Summary placeholder when no vision provider is configured.
const PLACEHOLDER_NO_MODEL: &str = "[Image could not be processed]";

/// Summary placeholder when the model declined or failed.
const PLACEHOLDER_FAILED: &str = "[Image could not be summarized]";

/// Convert documents into [`IndexingDocument`]s with processed sections.
///
/// Image sections are summarized to text through the vision provider when
/// one is configured, and replaced with a placeholder otherwise. The raw
/// sections are preserved alongside.
pub async fn process_image_sections(
    documents: Vec<Document>,
    vision: Option<&dyn VisionProvider>,
) -> Vec<IndexingDocument> {
    let mut out = Vec::with_capacity(documents.len());
    for document in documents {
        let mut processed = Vec::with_capacity(document.sections.len());
        for section in &document.sections {
            match section {
                Section::Text { text, link } => processed.push(ProcessedSection {
                    text: text.clone(),
                    link: link.clone(),
                    image_file_name: None,
                }),
                Section::Image {
                    image_file_name,
                    link,
                } => {
                    let text = match vision {
                        None => PLACEHOLDER_NO_MODEL.to_owned(),
                        Some(model) => {
                            match model
                                .summarize_image(image_file_name, &document.semantic_identifier)
                                .await
                            {
                                Ok(Some(summary)) => summary,
                                Ok(None) => PLACEHOLDER_FAILED.to_owned(),
                                Err(e) => {
                                    tracing::error!(
                                        doc = %document.id,
                                        image = %image_file_name,
                                        error = %e,
                                        "Error processing image section"
                                    );
                                    PLACEHOLDER_FAILED.to_owned()
                                }
                            }
                        }
                    };
                    processed.push(ProcessedSection {
                        text,
                        link: link.clone(),
                        image_file_name: Some(image_file_name.clone()),
                    });
                }
            }
        }
        out.push(IndexingDocument {
            document,
            processed_sections: processed,
        });
    }
    out
}
