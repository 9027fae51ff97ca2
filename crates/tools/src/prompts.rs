//! Generation prompts for the document and suggestion flows.
//!
//! The product voice is French; these strings are user-visible model
//! instructions, not code, and stay in French.

/// System prompt for generating a fresh text document from a title.
pub const TEXT_WRITER_PROMPT: &str =
    "Écrivez sur le sujet donné. Le markdown est pris en charge. Utilisez des titres lorsque cela est approprié.";

/// System prompt for writing a document from research findings.
pub const SEARCH_WRITER_PROMPT: &str =
    "Sur la base des résultats de la recherche, écrivez sur le sujet donné. Le markdown est pris en charge. Utilisez des titres lorsque cela est approprié.";

/// System prompt for generating self-contained Python snippets.
pub const CODE_PROMPT: &str = r#"
Vous êtes un générateur de code Python qui crée des extraits de code autonomes et exécutables. Lorsque vous écrivez du code :

1. Chaque extrait doit être complet et exécutable de manière autonome
2. Préférez utiliser des instructions print() pour afficher les sorties
3. Incluez des commentaires utiles pour expliquer le code
4. Gardez les extraits concis (généralement moins de 15 lignes)
5. Évitez les dépendances externes - utilisez la bibliothèque standard de Python
6. Gérez les erreurs potentielles de manière élégante
7. Retournez une sortie significative qui démontre la fonctionnalité du code
8. N'utilisez pas d'instructions input() ou d'autres fonctions interactives
9. N'accédez pas aux fichiers ou aux ressources réseau
10. N'utilisez pas de boucles infinies
"#;

/// System prompt for proposing writing suggestions on a document.
pub const SUGGESTIONS_PROMPT: &str =
    "Vous êtes un assistant d'écriture. Étant donné un texte, proposez des suggestions pour améliorer le texte et décrivez la modification. Il est très important que les modifications contiennent des phrases complètes au lieu de simples mots. Maximum 5 suggestions.";

/// System prompt for revising an existing document.
pub fn update_document_prompt(current_content: &str) -> String {
    format!(
        "Update the following contents of the document based on the given prompt.\n\n{current_content}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_prompt_embeds_current_content() {
        let prompt = update_document_prompt("Il était une fois");
        assert!(prompt.contains("Il était une fois"));
        assert!(prompt.starts_with("Update the following contents"));
    }
}
