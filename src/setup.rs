//! `zimport credentials setup`: interactive credential entry.
//!
//! Starts from the existing credential file and the environment, prompts
//! for whatever is missing, checks the Zotero key, and writes the file.

use crate::config::{mask, Credentials, LibraryKind};
use crate::error::{ImportError, Result};
use crate::zotero::ZoteroClient;
use std::path::Path;
use std::time::Duration;

/// One credential field as the wizard presents it.
struct Field {
    name: &'static str,
    label: &'static str,
    hint: &'static str,
    secret: bool,
}

const FIELDS: [Field; 4] = [
    Field {
        name: "library_id",
        label: "Zotero library ID",
        hint: "Your user ID is shown at https://www.zotero.org/settings/keys",
        secret: false,
    },
    Field {
        name: "api_key",
        label: "Zotero API key",
        hint: "Create a key with write access at https://www.zotero.org/settings/keys/new",
        secret: true,
    },
    Field {
        name: "openai_key",
        label: "OpenAI API key",
        hint: "https://platform.openai.com/api-keys",
        secret: true,
    },
    Field {
        name: "firecrawl_key",
        label: "Firecrawl API key",
        hint: "https://www.firecrawl.dev/app/api-keys",
        secret: true,
    },
];

fn slot<'a>(creds: &'a mut Credentials, name: &str) -> &'a mut String {
    match name {
        "library_id" => &mut creds.library_id,
        "api_key" => &mut creds.api_key,
        "openai_key" => &mut creds.openai_key,
        _ => &mut creds.firecrawl_key,
    }
}

fn display(field: &Field, value: &str) -> String {
    if field.secret {
        mask(value)
    } else {
        value.to_string()
    }
}

fn prompt_error(e: dialoguer::Error) -> ImportError {
    ImportError::Config(format!("Failed to read input: {}", e))
}

/// Ask for one value, offering to keep the current one.
fn prompt_field(field: &Field, current: &str, yes: bool) -> Result<String> {
    if !current.trim().is_empty() {
        println!("  {}: {}", field.label, display(field, current));
        let keep = yes
            || dialoguer::Confirm::new()
                .with_prompt("  Keep this value?")
                .default(true)
                .interact()
                .map_err(prompt_error)?;
        if keep {
            return Ok(current.to_string());
        }
    } else if yes {
        return Err(ImportError::MissingCredential(field.name));
    }

    println!("  {}", field.hint);
    let value: String = if field.secret {
        dialoguer::Password::new()
            .with_prompt(format!("  Enter {}", field.label))
            .interact()
            .map_err(prompt_error)?
    } else {
        dialoguer::Input::new()
            .with_prompt(format!("  Enter {}", field.label))
            .interact_text()
            .map_err(prompt_error)?
    };

    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ImportError::MissingCredential(field.name));
    }
    Ok(value)
}

/// Check the Zotero key against the API.
///
/// A rejected key is an error; an unreachable API only warns.
async fn validate_zotero(creds: &Credentials, kind: LibraryKind) -> Result<()> {
    let client = ZoteroClient::with_base_url(
        "https://api.zotero.org",
        kind,
        &creds.library_id,
        &creds.api_key,
        Duration::from_secs(30),
    )?;
    match client.current_key().await {
        Ok(info) => {
            println!("  Validating... OK (key belongs to {})", info.username);
            if kind == LibraryKind::User && info.user_id.to_string() != creds.library_id.trim() {
                println!(
                    "  Note: this key belongs to user {} but the library ID is {}.",
                    info.user_id, creds.library_id
                );
            }
            Ok(())
        }
        Err(ImportError::AuthRequired(_)) | Err(ImportError::NotFound(_)) => Err(ImportError::Config(
            "Zotero rejected the API key. Check it at https://www.zotero.org/settings/keys".to_string(),
        )),
        Err(e) => {
            println!("  Validating... WARNING: could not reach Zotero ({})", e);
            println!("  Continuing; the credentials will be saved.");
            Ok(())
        }
    }
}

/// Run the credential wizard and save the result to `path`.
///
/// With `yes`, existing values are kept without asking and a missing one
/// is an error.
pub async fn run_setup(path: &Path, kind: LibraryKind, skip_validation: bool, yes: bool) -> Result<()> {
    println!();
    println!("zimport credentials setup");
    println!("=========================");
    println!();

    let existing = Credentials::load(path)?.unwrap_or_default();
    let mut creds = Credentials::from_env().or(existing);

    for field in &FIELDS {
        let current = slot(&mut creds, field.name).clone();
        let value = prompt_field(field, &current, yes)?;
        *slot(&mut creds, field.name) = value;
        println!();
    }
    creds.validate()?;

    if skip_validation {
        println!("  Skipping validation (--skip-validation).");
    } else {
        validate_zotero(&creds, kind).await?;
    }

    creds.save(path)?;
    println!();
    println!("Credentials saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_cover_every_field() {
        let mut creds = Credentials::default();
        for (i, field) in FIELDS.iter().enumerate() {
            *slot(&mut creds, field.name) = format!("value-{}", i);
        }
        assert_eq!(creds.library_id, "value-0");
        assert_eq!(creds.api_key, "value-1");
        assert_eq!(creds.openai_key, "value-2");
        assert_eq!(creds.firecrawl_key, "value-3");
    }

    #[test]
    fn test_noninteractive_prompting() {
        let field = &FIELDS[2];
        assert_eq!(prompt_field(field, "sk-existing", true).unwrap(), "sk-existing");
        assert!(matches!(
            prompt_field(field, "", true),
            Err(ImportError::MissingCredential("openai_key"))
        ));
    }

    #[test]
    fn test_display_masks_only_secrets() {
        assert_eq!(display(&FIELDS[0], "475425"), "475425");
        assert_eq!(display(&FIELDS[1], "abcdefgh"), "****efgh");
    }
}
