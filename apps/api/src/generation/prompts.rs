// All LLM prompt constants for pitch generation.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{render, NO_EXTRA_TEXT_INSTRUCTION};

/// System prompt — enforces the six-line numbered format the extractor expects.
pub const PITCH_SYSTEM: &str = "Tu es un assistant spécialisé dans la création de pitchs structurés. \
    Tu dois TOUJOURS répondre dans un format STRICT avec 6 sections numérotées en français. \
    Chaque section doit être sur SA PROPRE LIGNE, commençant par le numéro suivi d'un point, \
    puis le label entre crochets, puis le contenu. EXEMPLE DE FORMAT OBLIGATOIRE:\n\n\
    1. [Problème] Texte du problème ici\n\
    2. [Solution] Texte de la solution ici\n\
    3. [Marché] Texte du marché ici\n\
    4. [Valeur] Texte de la valeur ici\n\
    5. [Canaux] Texte des canaux ici\n\
    6. [Modèle] Texte du modèle ici\n\n\
    Une seule section par ligne. Utilise EXACTEMENT ce format avec les numéros, points, \
    crochets et labels en français.";

/// User prompt template. Replace `{project_description}` before sending.
pub const PITCH_PROMPT_TEMPLATE: &str = r#"Génère un pitch structuré pour ce projet en utilisant EXACTEMENT le format ci-dessous (une ligne par section) :

1. [Problème] Décris le problème spécifique que ce projet résout
2. [Solution] Décris la solution concrète que ce projet apporte
3. [Marché] Décris le marché cible et l'opportunité
4. [Valeur] Décris la proposition de valeur unique
5. [Canaux] Décris les canaux de distribution/acquisition
6. [Modèle] Décris le modèle économique

Description du projet : {project_description}

Réponds UNIQUEMENT avec les 6 lignes au format ci-dessus, sans texte avant ou après."#;

/// The (system, user) instruction pair for one project description.
pub fn pitch_prompts(project_description: &str) -> (String, String) {
    let system = format!("{PITCH_SYSTEM}\n\n{NO_EXTRA_TEXT_INSTRUCTION}");
    let user = render(
        PITCH_PROMPT_TEMPLATE,
        &[("project_description", project_description.trim())],
    );
    (system, user)
}
