//! Prompt templates keyed by analysis kind.
//!
//! Templates are pure string formatting: variables in `{braces}` are
//! substituted from a caller-supplied map, required variables are
//! checked up front, and nothing else happens. Provider-specific tuning
//! lives in the optimizer, not here.

use std::collections::HashMap;

use crate::error::TemplateError;
use crate::models::AnalysisKind;

/// Variables substituted into a template.
pub type TemplateVars = HashMap<&'static str, String>;

/// A rendered prompt together with the template version that produced
/// it, so response scoring can be tied to a template generation.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub text: String,
    pub version: u32,
}

struct Template {
    text: &'static str,
    required: &'static [&'static str],
    /// Optional variables filled with defaults when absent.
    defaults: &'static [(&'static str, &'static str)],
    version: u32,
}

impl Template {
    fn render(&self, vars: &TemplateVars) -> Result<RenderedPrompt, TemplateError> {
        for var in self.required {
            if !vars.contains_key(var) {
                return Err(TemplateError::MissingVariable(var.to_string()));
            }
        }

        let mut text = self.text.to_string();
        for (name, value) in vars {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        for (name, default) in self.defaults {
            let placeholder = format!("{{{}}}", name);
            if text.contains(&placeholder) {
                text = text.replace(&placeholder, default);
            }
        }

        Ok(RenderedPrompt {
            text,
            version: self.version,
        })
    }
}

const FULL_ANALYSIS: Template = Template {
    text: "\
Analyze the following content and provide a complete analysis.

{document_info}{content}

The analysis must include:
1. A concise summary (at most 3 paragraphs)
2. Main keywords (5-10)
3. Detected entities (people, organizations, locations, dates)
4. The main topic of the document
5. The document type
6. The apparent purpose of the document

Respond only with a valid JSON object using this exact structure:
{
    \"summary\": \"document summary\",
    \"keywords\": [\"keyword1\", \"keyword2\"],
    \"entities\": [
        {\"type\": \"PERSON\", \"value\": \"name\", \"relevance\": 0.95},
        {\"type\": \"ORG\", \"value\": \"organization\", \"relevance\": 0.87}
    ],
    \"main_topic\": \"main topic\",
    \"document_type\": \"document type\",
    \"purpose\": \"document purpose\"
}",
    required: &["content", "document_info"],
    defaults: &[],
    version: 2,
};

const SUMMARY: Template = Template {
    text: "\
Summarize the following content in at most {max_paragraphs} paragraphs:

{document_info}{content}

The summary must capture the main points and preserve the essence of the
original document.",
    required: &["content"],
    defaults: &[("document_info", ""), ("max_paragraphs", "3")],
    version: 1,
};

const CLASSIFICATION: Template = Template {
    text: "\
Classify the following content:

{document_info}{content}

Determine the document type and its main topic.

Respond only with a valid JSON object using this exact structure:
{
    \"document_type\": \"document type\",
    \"main_topic\": \"main topic in 2-4 words\",
    \"confidence\": 0.0
}",
    required: &["content"],
    defaults: &[("document_info", "")],
    version: 1,
};

const ENTITY_EXTRACTION: Template = Template {
    text: "\
Extract the entities mentioned in the following content:

{document_info}{content}

Identify people, organizations, locations, dates and other notable
entities, each with a relevance between 0 and 1.

Respond only with a valid JSON object using this exact structure:
{
    \"entities\": [
        {\"type\": \"PERSON\", \"value\": \"name\", \"relevance\": 0.95}
    ]
}",
    required: &["content"],
    defaults: &[("document_info", "")],
    version: 1,
};

const INTENT: Template = Template {
    text: "\
Analyze the following content and classify the intent or main purpose of
the document:

{document_info}{content}

Determine:
1. The primary intent (informative, persuasive, instructional, etc.)
2. Possible secondary intents
3. The target audience
4. Whether there is a call to action

Respond only with a valid JSON object using this exact structure:
{
    \"intent\": {
        \"primary\": \"primary intent\",
        \"confidence\": 0.0,
        \"secondary\": [
            {\"type\": \"secondary intent\", \"confidence\": 0.0}
        ]
    },
    \"target_audience\": \"target audience\",
    \"call_to_action\": null
}",
    required: &["content"],
    defaults: &[("document_info", "")],
    version: 1,
};

const RELATION_EXTRACTION: Template = Template {
    text: "\
Analyze the following content and extract the semantic relations between
the identified entities plus the main contextual topics:

{document_info}{content}

Identify relations such as \"works for\", \"is part of\", \"located in\",
\"created by\", \"associated with\". For each main topic or concept,
provide contextual information including how it relates to the overall
subject.

Respond only with a valid JSON object using this exact structure:
{
    \"relations\": [
        {
            \"source\": \"source entity\",
            \"type\": \"relation type\",
            \"target\": \"target entity\",
            \"confidence\": 0.0
        }
    ],
    \"contexts\": [
        {
            \"entity\": \"entity or concept name\",
            \"type\": \"TOPIC/CONCEPT/TECHNOLOGY/PROCESS/ORGANIZATION\",
            \"description\": \"contextual description\",
            \"references\": [\"reference in the document\"],
            \"importance\": 0.0
        }
    ]
}",
    required: &["content"],
    defaults: &[("document_info", "")],
    version: 1,
};

/// Catalog of parameterized prompt templates.
#[derive(Debug, Default)]
pub struct PromptTemplateCatalog;

impl PromptTemplateCatalog {
    pub fn new() -> Self {
        Self
    }

    fn template(kind: AnalysisKind) -> &'static Template {
        match kind {
            AnalysisKind::FullAnalysis => &FULL_ANALYSIS,
            AnalysisKind::Summary => &SUMMARY,
            AnalysisKind::Classification => &CLASSIFICATION,
            AnalysisKind::EntityExtraction => &ENTITY_EXTRACTION,
            AnalysisKind::Intent => &INTENT,
            AnalysisKind::RelationExtraction => &RELATION_EXTRACTION,
        }
    }

    /// Render the template for `kind` with the given variables.
    pub fn render(
        &self,
        kind: AnalysisKind,
        vars: &TemplateVars,
    ) -> Result<RenderedPrompt, TemplateError> {
        Self::template(kind).render(vars)
    }

    /// Variables a template cannot be rendered without.
    pub fn required_variables(&self, kind: AnalysisKind) -> &'static [&'static str] {
        Self::template(kind).required
    }
}
