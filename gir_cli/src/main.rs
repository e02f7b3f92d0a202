//! Command-line driver: parse GIR files, build typelibs, validate them,
//! write them out as raw binaries or embeddable C source.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser as ClapParser;
use gir_parser::Parser;
use gir_typelib::{validate, Typelib};
use log::{debug, warn, LevelFilter};

#[derive(ClapParser)]
#[command(name = "gir-compiler")]
#[command(about = "Compile GIR XML into binary typelibs", long_about = None)]
struct Cli {
    /* Input GIR files */
    #[arg(value_name = "FILE", required = true)]
    inputs: Vec<PathBuf>,

    /* Directories to search for included GIR files */
    #[arg(long = "includedir", value_name = "DIR")]
    includedirs: Vec<PathBuf>,

    /* Output file; stdout when omitted */
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /* Only compile the module with this name */
    #[arg(short = 'm', long = "module", value_name = "NAME")]
    module: Option<String>,

    /* Override the shared library recorded in the typelib */
    #[arg(short = 'l', long = "shared-library", value_name = "LIB")]
    shared_library: Option<String>,

    /* Emit C source embedding the typelib instead of the raw binary */
    #[arg(long = "code")]
    code: bool,

    /* With --code, do not emit the registration constructor */
    #[arg(long = "no-init")]
    no_init: bool,

    /* Dump the parsed IR as JSON instead of compiling */
    #[arg(long = "dump-ir")]
    dump_ir: bool,

    /* Show debug messages */
    #[arg(long = "debug")]
    debug: bool,

    /* Show verbose messages */
    #[arg(long = "verbose")]
    verbose: bool,
}

/// Render the typelib as a C byte array, optionally with a constructor that
/// registers it on load.
fn format_code(typelib: &Typelib, no_init: bool) -> String {
    let mut out = String::new();
    out.push_str("#include <stdlib.h>\n");
    out.push_str("#include <girepository.h>\n\n");
    out.push_str("const unsigned char _G_TYPELIB[] = \n{");
    for (i, byte) in typelib.as_bytes().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if i % 10 == 0 {
            out.push_str("\n\t");
        }
        out.push_str(&format!("{byte:#04x}"));
    }
    out.push_str("\n};\n\n");
    out.push_str(&format!(
        "const size_t _G_TYPELIB_SIZE = {};\n\n",
        typelib.len()
    ));
    if !no_init {
        out.push_str(
            "__attribute__((constructor)) void register_typelib (void);\n\n\
             __attribute__((constructor)) void\n\
             register_typelib (void)\n\
             {\n\
             \tGTypelib *typelib;\n\
             \ttypelib = g_typelib_new_from_const_memory (_G_TYPELIB, _G_TYPELIB_SIZE);\n\
             \tg_irepository_load_typelib (NULL, typelib, G_IREPOSITORY_LOAD_FLAG_LAZY, NULL);\n\
             }\n\n",
        );
    }
    out
}

fn write_out(
    cli: &Cli,
    prefix: Option<&str>,
    typelib: &Typelib,
) -> anyhow::Result<()> {
    let payload: Vec<u8> = if cli.code {
        format_code(typelib, cli.no_init).into_bytes()
    } else {
        typelib.as_bytes().to_vec()
    };

    match &cli.output {
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload).context("writing to stdout")?;
            stdout.flush().context("flushing stdout")?;
        }
        Some(output) => {
            let path = match prefix {
                Some(prefix) => {
                    let name = format!("{prefix}-{}", output.display());
                    PathBuf::from(name)
                }
                None => output.clone(),
            };
            std::fs::write(&path, &payload)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut parser = Parser::new();
    for dir in &cli.includedirs {
        parser.add_include_dir(dir);
    }

    debug!("[parsing] start, {} includes", cli.includedirs.len());
    let mut to_build: Vec<String> = Vec::new();
    for input in &cli.inputs {
        let names = parser
            .parse_file(input)
            .with_context(|| format!("error parsing file '{}'", input.display()))?;
        to_build.extend(names);
    }
    debug!("[parsing] done");

    let modules = parser.into_modules();

    if cli.dump_ir {
        let selected: Vec<_> = modules
            .iter()
            .filter(|module| to_build.contains(&module.name))
            .collect();
        serde_json::to_writer_pretty(std::io::stdout().lock(), &selected)
            .context("serializing IR")?;
        println!();
        return Ok(());
    }

    debug!("[building] start");
    let mut built = 0usize;
    let many = to_build.len() > 1;
    for name in &to_build {
        if let Some(only) = &cli.module {
            if only != name {
                continue;
            }
        }
        let Some(module) = modules.iter().find(|module| &module.name == name) else {
            bail!("module '{name}' disappeared after parsing");
        };
        let mut target = module.clone();
        if let Some(shared_library) = &cli.shared_library {
            target.shared_library = Some(shared_library.clone());
        }

        debug!("[building] module {name}");
        let typelib = gir_gen::build_typelib(&mut target, &modules)
            .with_context(|| format!("failed to build typelib for module '{name}'"))?;
        validate(&typelib)
            .with_context(|| format!("invalid typelib for module '{name}'"))?;

        let prefix = if cli.module.is_none() && many && cli.output.is_some() {
            Some(name.as_str())
        } else {
            None
        };
        write_out(&cli, prefix, &typelib)?;
        built += 1;

        // Binary-safe stdout can only carry one image.
        if cli.output.is_none() && cli.module.is_none() && many {
            warn!("{} modules omitted", to_build.len() - built);
            break;
        }
    }
    debug!("[building] done");

    if built == 0 {
        bail!("no modules were built");
    }
    Ok(())
}
