//! Axum route handlers for the Pitch API.

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::generation::record::PitchRecord;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GeneratePitchRequest {
    pub project_description: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/pitches
///
/// Validates the description, runs the generator and returns the six sections.
/// On failure the handler decides the message: a client without usable
/// credentials is a configuration error, anything else a generation failure.
pub async fn handle_generate_pitch(
    State(state): State<AppState>,
    Json(request): Json<GeneratePitchRequest>,
) -> Result<Json<PitchRecord>, AppError> {
    let description = validate_description(
        &request.project_description,
        state.config.min_input_chars,
        state.config.max_input_chars,
    )?;

    info!(
        "Pitch requested for {:?}",
        description.chars().take(50).collect::<String>()
    );

    match state.generator.generate(description).await {
        Some(record) => Ok(Json(PitchRecord::clone(&record))),
        None => Err(failure_for(&state)),
    }
}

fn failure_for(state: &AppState) -> AppError {
    match state.generator.client().check_credentials() {
        Err(e) if e.is_configuration() => AppError::Configuration(format!(
            "La clé API OpenAI n'est pas configurée correctement ({e}). \
            Veuillez définir la variable d'environnement OPENAI_API_KEY."
        )),
        _ => AppError::Generation(
            "Impossible de générer le pitch. Cela peut être dû à un problème réseau, \
            un timeout ou une erreur de l'API OpenAI. Veuillez réessayer dans quelques instants."
                .to_string(),
        ),
    }
}

/// Checks the description against the configured bounds (in characters) and
/// returns it trimmed.
pub fn validate_description(raw: &str, min_chars: usize, max_chars: usize) -> Result<&str, AppError> {
    let description = raw.trim();
    let len = description.chars().count();

    if len == 0 {
        return Err(AppError::Validation(
            "Veuillez décrire votre projet.".to_string(),
        ));
    }
    if len < min_chars {
        return Err(AppError::Validation(format!(
            "La description doit contenir au moins {min_chars} caractères."
        )));
    }
    if len > max_chars {
        return Err(AppError::Validation(format!(
            "La description ne doit pas dépasser {max_chars} caractères."
        )));
    }
    Ok(description)
}
