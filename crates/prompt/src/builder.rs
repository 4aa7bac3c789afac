//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use planes_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Every variable listed under `input.variables` must be present. The
/// system template is rendered only when the definition has one.
///
/// # Example
/// ```no_run
/// use planes_prompt::{build_prompt, builtin_prompt};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = builtin_prompt("intent.classify")?;
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "¿Qué propone el PLN?".to_string());
///
/// let built = build_prompt(&def, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: &HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    if let Some(missing) = definition
        .input
        .variables
        .iter()
        .find(|name| !variables.contains_key(*name))
    {
        return Err(AppError::Prompt(format!(
            "Prompt {} requires variable '{}'",
            definition.id, missing
        )));
    }

    let system = if definition.system.trim().is_empty() {
        None
    } else {
        Some(render_template(&definition.system, variables)?.trim().to_string())
    };
    let user = render_template(&definition.template, variables)?
        .trim()
        .to_string();

    let mut names: Vec<String> = variables.keys().cloned().collect();
    names.sort();

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            variables: names,
        },
    })
}

/// Render a Handlebars template with variables.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{builtin_prompt, ANSWER_GROUNDED, INTENT_CLASSIFY};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_simple_template() {
        let result = render_template("Pregunta: {{question}}", &vars(&[("question", "¿Y el FA?")]));
        assert_eq!(result.unwrap(), "Pregunta: ¿Y el FA?");
    }

    #[test]
    fn test_no_html_escaping() {
        let result = render_template("{{context}}", &vars(&[("context", "<a & b>")]));
        assert_eq!(result.unwrap(), "<a & b>");
    }

    #[test]
    fn test_missing_required_variable() {
        let def = builtin_prompt(INTENT_CLASSIFY).unwrap();
        let err = build_prompt(&def, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_intent_prompt_history_is_conditional() {
        let def = builtin_prompt(INTENT_CLASSIFY).unwrap();

        let without = build_prompt(&def, &vars(&[("question", "¿Y el PUSC?")])).unwrap();
        assert!(!without.user.contains("CONTEXTO DE LA CONVERSACIÓN PREVIA"));
        assert!(without.user.ends_with("Pregunta actual: ¿Y el PUSC?"));

        let with = build_prompt(
            &def,
            &vars(&[
                ("question", "¿Y el PUSC?"),
                ("history", "user: ¿Qué propone el PLN sobre salud?"),
            ]),
        )
        .unwrap();
        assert!(with.user.contains("CONTEXTO DE LA CONVERSACIÓN PREVIA"));
        assert!(with.user.contains("¿Qué propone el PLN sobre salud?"));
    }

    #[test]
    fn test_answer_prompt_instructions_follow_flags() {
        let def = builtin_prompt(ANSWER_GROUNDED).unwrap();
        let base = [("question", "¿Qué proponen?"), ("context", "[Fuente 1] Partido: PLN")];

        let specific = build_prompt(&def, &vars(&base)).unwrap();
        let system = specific.system.unwrap();
        assert!(system.contains("partido ESPECÍFICO"));
        assert!(!system.contains("COMPARATIVA"));

        let mut comparison = vars(&base);
        comparison.insert("is_comparison".to_string(), "true".to_string());
        let built = build_prompt(&def, &comparison).unwrap();
        assert!(built.system.unwrap().contains("COMPARATIVA"));
        assert!(built.user.contains("[Fuente 1] Partido: PLN"));
        assert_eq!(
            built.metadata.variables,
            vec!["context", "is_comparison", "question"]
        );
    }
}
