use std::path::PathBuf;

use clap::{command, Arg, ArgAction, Command};
use context::Context;

mod batch;
mod context;
mod document;
mod frontmatter;
mod highlights;
mod images;
mod import;
mod note;
mod validate;

fn dir_arg(id: &'static str, long: &'static str, help: &'static str, default: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .help(help)
        .global(true)
        .value_parser(clap::value_parser!(PathBuf))
        .default_value(default)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = command!()
        .subcommand_required(true)
        .args(&[
            dir_arg(
                "ingest_dir",
                "ingest-dir",
                "Directory holding the exported markdown files and their image folders",
                "ingest-external-md",
            ),
            dir_arg(
                "staging_dir",
                "staging-dir",
                "Directory of post directories rewritten in place",
                "processed-staging",
            ),
            dir_arg(
                "posts_dir",
                "posts-dir",
                "Directory of published posts. Their slugs are treated as taken.",
                "posts",
            ),
            Arg::new("author")
                .long("author")
                .help("Site owner written to every post. Defaults to $BLOG_AUTHOR.")
                .global(true),
        ])
        .subcommands([
            Command::new("import").about("Create dated post directories from exported markdown"),
            Command::new("frontmatter").about("Normalize the metadata block of every staged post"),
            Command::new("highlights").about("Convert highlights and strip tags and hash references"),
            Command::new("images").about("Collect images into img/ and convert sizing syntax"),
            Command::new("validate")
                .about("Check staged posts without modifying them")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the reports as JSON")
                        .action(ArgAction::SetTrue),
                ),
        ])
        .get_matches();

    let (name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| anyhow::anyhow!("no subcommand given"))?;
    let context = Context::from_matches(sub_matches);
    log::debug!("{context:?}");

    match name {
        "import" => import::run(&context),
        "frontmatter" => frontmatter::run(&context),
        "highlights" => highlights::run(&context),
        "images" => images::run(&context),
        "validate" => validate::run(&context, sub_matches.get_flag("json")),
        _ => unreachable!(),
    }
}
