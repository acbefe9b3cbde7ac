//! Command line surface and dispatch.

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use inquire::Password;
use log::info;

use crate::batch;
use crate::bundle::{BundleGenerator, BundleRequest, DEFAULT_P12_PASSWORD};
use crate::config::Config;
use crate::error::{CertgenError, Result};
use crate::inspect;
use crate::key::KeySize;
use crate::layout::{self, OutputLayout};
use crate::request::{GenerationRequest, Outcome, RequestGenerator};
use crate::subject::{FieldOverrides, Subject, SubjectResolver, SubjectTemplate};

/// Generate and inspect certificate signing requests and PKCS#12 archives.
#[derive(Debug, Parser)]
#[command(name = "certgen", version, about)]
pub struct Cli {
    /// Print informational messages.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print debug messages.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the managed folder tree and starter files.
    Init {
        /// Store the certificate tree here instead of the default location.
        #[arg(long)]
        cert_folder: Option<PathBuf>,
        /// Remember this CSV file as the batch source.
        #[arg(long)]
        csv_file: Option<String>,
    },

    /// Generate one private key and certificate signing request.
    Create {
        /// Request name; also seeds the Common Name. When omitted, the
        /// Common Name resolved from the template or prompts is used.
        name: Option<String>,
        #[command(flatten)]
        r#gen: GenArgs,
    },

    /// Generate a key/csr pair for every serial in a CSV file.
    CreateMultiple {
        /// CSV source; defaults to the configured csvfile.
        #[arg(long)]
        csv_file: Option<String>,
        #[command(flatten)]
        r#gen: GenArgs,
    },

    /// Package a private key and a signed certificate into a .p12 archive.
    CreateP12 {
        /// Archive name.
        name: String,
        /// Private key file (.key).
        #[arg(long)]
        key: PathBuf,
        /// Signed certificate file (.pem).
        #[arg(long)]
        pem: PathBuf,
        /// Archive password.
        #[arg(long)]
        password: Option<String>,
        /// Overwrite an existing archive.
        #[arg(long)]
        force: bool,
    },

    /// Package archives for every serial in a CSV file.
    CreateMultipleP12 {
        /// CSV source; defaults to the configured csvfile.
        #[arg(long)]
        csv_file: Option<String>,
        /// Folder holding the signed certificates (<name>.pem).
        #[arg(long)]
        pem_folder: PathBuf,
        /// Folder holding the keys (<name>.key); defaults to the managed
        /// csr tree.
        #[arg(long)]
        key_folder: Option<PathBuf>,
        /// Archive password.
        #[arg(long)]
        password: Option<String>,
        /// Overwrite existing archives.
        #[arg(long)]
        force: bool,
    },

    /// Inspect a .csr or .p12 file.
    Read {
        file: PathBuf,
        /// Archive password; prompted for a .p12 when absent.
        #[arg(long)]
        password: Option<String>,
        /// Plain-text report instead of JSON.
        #[arg(long)]
        plain_text: bool,
    },

    /// Read, edit or delete the persisted configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration.
    Read,
    /// Change configured values.
    Edit {
        #[arg(long)]
        cert_folder: Option<PathBuf>,
        #[arg(long)]
        csv_file: Option<String>,
    },
    /// Remove custom options; with no flags the whole custom section.
    Delete {
        /// Forget only the custom certificate folder.
        #[arg(long)]
        cert_folder: bool,
        /// Forget only the custom CSV source.
        #[arg(long)]
        csv_file: bool,
    },
}

/// Options shared by the request generation commands.
#[derive(Debug, Args)]
pub struct GenArgs {
    /// Regenerate even if the key/csr pair already exists.
    #[arg(long)]
    pub force: bool,

    /// RSA modulus size (1024, 2048 or 4096).
    #[arg(long, default_value_t = 2048)]
    pub key_size: u32,

    /// Subject alternative DNS name; repeatable.
    #[arg(long)]
    pub san: Vec<String>,

    /// Prompt interactively for subject fields left unset.
    #[arg(long)]
    pub subject: bool,

    /// Pre-fill the subject from the YAML template in the app folder.
    #[arg(long)]
    pub config: bool,

    /// Request CA:TRUE in basicConstraints.
    #[arg(long)]
    pub ca: bool,

    /// Country (2 letter code).
    #[arg(long)]
    pub country: Option<String>,
    /// Common Name.
    #[arg(long)]
    pub common_name: Option<String>,
    /// State or province.
    #[arg(long)]
    pub state: Option<String>,
    /// Locality.
    #[arg(long)]
    pub locality: Option<String>,
    /// Organization.
    #[arg(long)]
    pub org: Option<String>,
    /// Organizational unit.
    #[arg(long)]
    pub org_unit: Option<String>,
    /// Email address.
    #[arg(long)]
    pub email: Option<String>,
}

impl GenArgs {
    fn overrides(&self) -> FieldOverrides {
        FieldOverrides {
            country: self.country.clone(),
            common_name: self.common_name.clone(),
            state: self.state.clone(),
            locality: self.locality.clone(),
            organization: self.org.clone(),
            organizational_unit: self.org_unit.clone(),
            email: self.email.clone(),
        }
    }

    fn template(&self, config: &Config, layout: &OutputLayout) -> Result<Option<SubjectTemplate>> {
        if !self.config {
            return Ok(None);
        }
        let path = layout.app.join(&config.default.yaml_file);
        Ok(Some(SubjectTemplate::from_path(&path)?))
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init {
            cert_folder,
            csv_file,
        } => init(cert_folder, csv_file),
        Command::Create { name, r#gen } => create(name.as_deref(), &r#gen),
        Command::CreateMultiple { csv_file, r#gen } => create_multiple(csv_file.as_deref(), &r#gen),
        Command::CreateP12 {
            name,
            key,
            pem,
            password,
            force,
        } => create_p12(&name, key, pem, password, force),
        Command::CreateMultipleP12 {
            csv_file,
            pem_folder,
            key_folder,
            password,
            force,
        } => create_multiple_p12(
            csv_file.as_deref(),
            &pem_folder,
            key_folder.as_deref(),
            password,
            force,
        ),
        Command::Read {
            file,
            password,
            plain_text,
        } => read(&file, password, plain_text),
        Command::Config { action } => configure(action),
    }
}

fn init(cert_folder: Option<PathBuf>, csv_file: Option<String>) -> Result<()> {
    let config_path = Config::path();
    let layout = match cert_folder {
        Some(folder) => layout::set_custom_folder(&config_path, &folder)?,
        None => {
            let config = Config::load_from(&config_path)?;
            config.store_to(&config_path)?;
            let layout = OutputLayout::resolve(&config);
            layout.ensure()?;
            layout
        }
    };
    if let Some(file) = csv_file {
        layout::set_custom_csv(&config_path, &file)?;
    }

    let config = Config::load_from(&config_path)?;
    let starter_yaml = layout.app.join(&config.default.yaml_file);
    if !starter_yaml.exists() {
        fs::write(&starter_yaml, SubjectTemplate::starter())?;
        info!("starter template {} written", starter_yaml.display());
    }
    let starter_csv = layout.csv.join("serial.csv");
    if !starter_csv.exists() {
        fs::write(&starter_csv, batch::STARTER_CSV)?;
        info!("starter csv {} written", starter_csv.display());
    }

    println!("app folder ready: {}", layout.app.display());
    Ok(())
}

fn create(name: Option<&str>, r#gen: &GenArgs) -> Result<()> {
    let config = Config::load()?;
    let layout = OutputLayout::resolve(&config);
    layout.ensure()?;

    let overrides = r#gen.overrides();
    let template = r#gen.template(&config, &layout)?;
    let resolver = SubjectResolver {
        overrides: &overrides,
        template: template.as_ref(),
        san: &r#gen.san,
        interactive: r#gen.subject,
    };
    let subject = resolver.resolve(name)?;
    let name = resolved_name(name, &subject)?;

    let generator = RequestGenerator { layout: &layout };
    let outcome = generator.generate(&GenerationRequest {
        name: name.clone(),
        subject,
        key_size: KeySize::from_bits(r#gen.key_size),
        ca: r#gen.ca,
        force: r#gen.force,
    })?;
    report_outcome(&name, outcome, &layout.csr.display().to_string());
    Ok(())
}

/// An explicit name wins; otherwise the resolved Common Name is the
/// request name. A request cannot be anonymous.
fn resolved_name(explicit: Option<&str>, subject: &Subject) -> Result<String> {
    match explicit {
        Some(name) => Ok(name.to_string()),
        None => subject
            .common_name()
            .map(str::to_string)
            .ok_or(CertgenError::MissingName),
    }
}

fn create_multiple(csv_file: Option<&str>, r#gen: &GenArgs) -> Result<()> {
    let config = Config::load()?;
    let layout = OutputLayout::resolve(&config);
    layout.ensure()?;

    let source = batch::resolve_source(csv_file, &config, &layout)?;
    let names = batch::list_names(&source)?;

    let overrides = r#gen.overrides();
    let template = r#gen.template(&config, &layout)?;
    let generator = RequestGenerator { layout: &layout };

    let (mut written, mut skipped) = (0usize, 0usize);
    for name in &names {
        let resolver = SubjectResolver {
            overrides: &overrides,
            template: template.as_ref(),
            san: &r#gen.san,
            interactive: r#gen.subject,
        };
        let subject = resolver.resolve(Some(name))?;
        let outcome = generator.generate(&GenerationRequest {
            name: name.clone(),
            subject,
            key_size: KeySize::from_bits(r#gen.key_size),
            ca: r#gen.ca,
            force: r#gen.force,
        })?;
        report_outcome(name, outcome, &layout.csr.display().to_string());
        match outcome {
            Outcome::Written => written += 1,
            Outcome::Skipped => skipped += 1,
        }
    }
    println!("{written} generated, {skipped} skipped");
    Ok(())
}

fn create_p12(
    name: &str,
    key: PathBuf,
    pem: PathBuf,
    password: Option<String>,
    force: bool,
) -> Result<()> {
    let config = Config::load()?;
    let layout = OutputLayout::resolve(&config);
    layout.ensure()?;

    let generator = BundleGenerator { layout: &layout };
    let outcome = generator.generate(&BundleRequest {
        name: name.to_string(),
        key_file: key,
        cert_file: pem,
        password: password.unwrap_or_else(|| DEFAULT_P12_PASSWORD.to_string()),
        force,
    })?;
    report_outcome(name, outcome, &layout.p12.display().to_string());
    Ok(())
}

fn create_multiple_p12(
    csv_file: Option<&str>,
    pem_folder: &std::path::Path,
    key_folder: Option<&std::path::Path>,
    password: Option<String>,
    force: bool,
) -> Result<()> {
    let config = Config::load()?;
    let layout = OutputLayout::resolve(&config);
    layout.ensure()?;

    let source = batch::resolve_source(csv_file, &config, &layout)?;
    let names = batch::list_names(&source)?;

    let generator = BundleGenerator { layout: &layout };
    let results = generator.generate_multiple(
        &names,
        key_folder,
        pem_folder,
        password.as_deref().unwrap_or(DEFAULT_P12_PASSWORD),
        force,
    )?;
    for (name, outcome) in &results {
        report_outcome(name, *outcome, &layout.p12.display().to_string());
    }
    Ok(())
}

fn read(file: &std::path::Path, password: Option<String>, plain_text: bool) -> Result<()> {
    let is_p12 = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("p12"));
    let password = match (password, is_p12) {
        (Some(p), _) => Some(p),
        (None, true) => Some(
            Password::new("Enter the archive password:")
                .without_confirmation()
                .prompt()?,
        ),
        (None, false) => None,
    };

    let report = inspect::inspect(file, password.as_deref())?;
    println!("{}", inspect::render(&report, plain_text)?);
    Ok(())
}

fn configure(action: ConfigAction) -> Result<()> {
    let config_path = Config::path();
    match action {
        ConfigAction::Read => {
            let config = Config::load_from(&config_path)?;
            let layout = OutputLayout::resolve(&config);
            print!("{}", render_config(&config, &layout));
        }
        ConfigAction::Edit {
            cert_folder,
            csv_file,
        } => {
            if let Some(folder) = cert_folder {
                layout::set_custom_folder(&config_path, &folder)?;
                println!("cert_directory = {}", folder.display());
            }
            if let Some(file) = csv_file {
                layout::set_custom_csv(&config_path, &file)?;
                println!("csvfile = {file}");
            }
        }
        ConfigAction::Delete {
            cert_folder,
            csv_file,
        } => {
            if !config_path.exists() {
                println!("no configuration to remove");
                return Ok(());
            }
            Config::clear_custom_at(&config_path, cert_folder, csv_file)?;
            if cert_folder {
                println!("cert_directory removed");
            }
            if csv_file {
                println!("csvfile removed");
            }
            if !cert_folder && !csv_file {
                println!("custom configuration removed");
            }
        }
    }
    Ok(())
}

/// The `config read` view: the persisted store followed by the subject
/// template sitting in the app folder, when there is one.
fn render_config(config: &Config, layout: &OutputLayout) -> String {
    let mut out = config.show();
    let template = layout.app.join(&config.default.yaml_file);
    match fs::read_to_string(&template) {
        Ok(raw) => {
            out.push_str(&format!("\n# {}\n{raw}", template.display()));
        }
        Err(_) => {
            out.push_str("\nno subject template found, run `certgen init` first\n");
        }
    }
    out
}

fn report_outcome(name: &str, outcome: Outcome, folder: &str) {
    match outcome {
        Outcome::Written => println!("{name} generated in {folder}"),
        Outcome::Skipped => println!("{name} already exists, use --force to regenerate"),
    }
}
