//! Prompts sent to the vision gateway.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing extraction behaviour (e.g. the
//!    keyword count, or what counts as a cover page) means editing exactly
//!    one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live model, so schema regressions (a renamed JSON field, a dropped
//!    rule) are caught immediately.
//!
//! Both prompts ask for *JSON only*; the salvage logic in
//! [`crate::gateway`] still tolerates models that wrap the JSON in prose or
//! markdown fences anyway.

/// System prompt for the per-page OCR extraction.
pub const OCR_SYSTEM_PROMPT: &str = "You are an expert OCR and content analysis assistant. \
Analyze textbook/book pages and extract structured information. \
Always respond with valid JSON only, no markdown.";

/// User instruction for the per-page OCR extraction. The JSON skeleton spells
/// out the exact schema [`crate::records::PageExtraction`] deserialises.
pub const OCR_USER_PROMPT: &str = r#"Analyze this textbook/book page image and extract:
1. All visible text (OCR) - preserve key content, clean up formatting
2. Topics/Lessons mentioned (e.g., "Photosynthesis", "Chapter 5: Fractions", "Multiplication Tables")
3. Keywords for search (10-20 important searchable terms)
4. Chapter/Section title if visible
5. A brief 1-2 sentence summary of the page content

Return ONLY valid JSON in this exact format:
{
  "extracted_text": "full text content from the page",
  "topics": ["Topic 1", "Topic 2"],
  "keywords": ["keyword1", "keyword2", "keyword3"],
  "chapter_title": "Chapter title or null",
  "summary": "Brief summary of page content"
}"#;

/// System prompt for page-number detection.
pub const DETECT_SYSTEM_PROMPT: &str = r#"You are a page number detection assistant. Analyze book page images to detect the printed page number.

Your task:
1. Look for printed page numbers (usually at corners, header, or footer of the page)
2. Identify if this is a cover page (front cover, back cover, title page with book title/author)
3. Identify if this is a blank page (mostly white/empty)
4. For numbered pages, extract the exact page number shown

Respond with a JSON object only, no markdown:
{
  "detectedPageNumber": "1" or null if not found,
  "pageType": "numbered" | "cover" | "blank" | "unknown",
  "confidence": 0.0 to 1.0
}"#;

/// User instruction for page-number detection.
pub const DETECT_USER_PROMPT: &str =
    "Analyze this book page image and detect the page number if present. Return the result as JSON.";
