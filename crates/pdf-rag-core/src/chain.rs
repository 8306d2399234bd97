//! Prompt templates and sequential generation chains.
//!
//! A [`SequentialChain`] runs its steps in order: the first step's slot is
//! filled with the caller's input, every later step's slot with the previous
//! step's output. The final output is returned. [`single_prompt`] is the
//! degenerate one-step chain that sends the input straight to the model.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{RagError, Result};
use crate::generate::AnswerGenerator;
use crate::prompt::Prompt;
use crate::trace::{traced_async, Stage};

pub const REPORT_TEMPLATE: &str = "Generate a detailed report on {topic}";
pub const SUMMARY_TEMPLATE: &str = "Generate a 5 pointer summary from the following text \n {text}";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
    })
}

/// Text with `{name}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Names of every slot, deduplicated and sorted.
    pub fn variables(&self) -> BTreeSet<&str> {
        placeholder_regex()
            .captures_iter(&self.text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Fill every slot from `vars`. A slot without a value is an error.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut missing = None;
        let rendered = placeholder_regex().replace_all(&self.text, |caps: &Captures| {
            let name = &caps[1];
            match vars.iter().find(|(k, _)| *k == name) {
                Some((_, value)) => value.to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        if let Some(name) = missing {
            return Err(RagError::Configuration(format!(
                "template variable '{}' has no value",
                name
            )));
        }
        Ok(rendered.into_owned())
    }
}

/// One step of a [`SequentialChain`].
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub template: PromptTemplate,
    /// Slot that receives this step's input.
    pub input_var: String,
    /// Overrides the generator's temperature for this step.
    pub temperature: Option<f32>,
}

impl ChainStep {
    pub fn new(
        template: PromptTemplate,
        input_var: impl Into<String>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        let input_var = input_var.into();
        if !template.variables().contains(input_var.as_str()) {
            return Err(RagError::Configuration(format!(
                "template has no slot named '{}'",
                input_var
            )));
        }
        Ok(Self {
            template,
            input_var,
            temperature,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SequentialChain {
    steps: Vec<ChainStep>,
}

impl SequentialChain {
    pub fn new(steps: Vec<ChainStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(RagError::Configuration(
                "a chain needs at least one step".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub async fn run(&self, generator: &AnswerGenerator, input: &str) -> Result<String> {
        traced_async(
            generator.tracer(),
            generator.trace_context(),
            Stage::Chain,
            |out: &String| out.len(),
            async {
                let mut current = input.to_string();
                for step in &self.steps {
                    let text = step.template.render(&[(step.input_var.as_str(), &current)])?;
                    let mut options = *generator.options();
                    if let Some(t) = step.temperature {
                        options.temperature = t;
                    }
                    current = generator.generate_with(&Prompt::user(text), &options).await?;
                }
                Ok(current)
            },
        )
        .await
    }
}

/// Detailed report on `{topic}`, then a five-point summary of that report.
pub fn report_then_summary(
    report_temperature: Option<f32>,
    summary_temperature: Option<f32>,
) -> SequentialChain {
    SequentialChain {
        steps: vec![
            ChainStep {
                template: PromptTemplate::new(REPORT_TEMPLATE),
                input_var: "topic".to_string(),
                temperature: report_temperature,
            },
            ChainStep {
                template: PromptTemplate::new(SUMMARY_TEMPLATE),
                input_var: "text".to_string(),
                temperature: summary_temperature,
            },
        ],
    }
}

/// Send the input to the model as-is.
pub fn single_prompt() -> SequentialChain {
    SequentialChain {
        steps: vec![ChainStep {
            template: PromptTemplate::new("{question}"),
            input_var: "question".to_string(),
            temperature: None,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{GenerationBackend, GenerationOptions};
    use crate::trace::{MemoryTracer, TraceContext, Tracer};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records each prompt and replies with `out<n>`.
    #[derive(Default)]
    struct Scripted {
        seen: Mutex<Vec<(String, f32)>>,
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
            let mut seen = self.seen.lock().unwrap();
            seen.push((prompt.user_text().unwrap_or_default().to_string(), options.temperature));
            Ok(format!("out{}", seen.len()))
        }
    }

    fn generator(backend: Arc<Scripted>, tracer: Arc<dyn Tracer>) -> AnswerGenerator {
        AnswerGenerator::new(
            backend,
            GenerationOptions::default(),
            tracer,
            TraceContext::named("chain"),
        )
    }

    #[test]
    fn test_render_fills_slots() {
        let t = PromptTemplate::new("Report on {topic} for {who}; {topic} again");
        let out = t.render(&[("topic", "rust"), ("who", "me")]).unwrap();
        assert_eq!(out, "Report on rust for me; rust again");
        assert_eq!(t.variables().into_iter().collect::<Vec<_>>(), vec!["topic", "who"]);
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let t = PromptTemplate::new("Report on {topic}");
        assert!(matches!(t.render(&[("text", "x")]), Err(RagError::Configuration(_))));
    }

    #[test]
    fn test_step_requires_matching_slot() {
        let err = ChainStep::new(PromptTemplate::new("Summarize {text}"), "topic", None);
        assert!(matches!(err, Err(RagError::Configuration(_))));
        assert!(SequentialChain::new(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_chain_feeds_output_forward() {
        let backend = Arc::new(Scripted::default());
        let tracer = Arc::new(MemoryTracer::new());
        let generator = generator(backend.clone(), tracer.clone());

        let out = report_then_summary(None, Some(0.6))
            .run(&generator, "Unemployment in India")
            .await
            .unwrap();

        assert_eq!(out, "out2");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, "Generate a detailed report on Unemployment in India");
        assert_eq!(seen[0].1, 0.7);
        assert!(seen[1].0.ends_with("\n out1"));
        assert_eq!(seen[1].1, 0.6);
        assert_eq!(
            tracer.completed_stages(),
            vec![Stage::Generate, Stage::Generate, Stage::Chain]
        );
    }

    #[tokio::test]
    async fn test_single_prompt_passes_input_through() {
        let backend = Arc::new(Scripted::default());
        let generator = generator(backend.clone(), crate::trace::noop());
        let out = single_prompt()
            .run(&generator, "what is the capital of india?")
            .await
            .unwrap();
        assert_eq!(out, "out1");
        assert_eq!(backend.seen.lock().unwrap()[0].0, "what is the capital of india?");
    }
}
