use crate::cli::options::{build_context, PipelineArgs, TaxonomyArgs};
use crate::taxonomy::weighted_lca;
use crate::Taxonomy;
use anyhow::Context as _;
use clap::Args;
use colored::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use tracing::warn;

static WEIGHTED_TAXID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+):(\d+)$").unwrap());
static BARE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][\w.-]*$").unwrap());

#[derive(Args, Debug)]
pub struct LcaArgs {
    /// Observations as TAXID or TAXID:WEIGHT (weight defaults to 1)
    #[arg(value_name = "TAXID:WEIGHT", required = true)]
    pub observations: Vec<String>,

    /// Minimal fraction of the weight under the answer
    #[arg(short, long, default_value_t = 0.8)]
    pub threshold: f64,

    #[command(flatten)]
    pub taxonomy: TaxonomyArgs,
}

/// Splits `taxid:weight`. A trailing `:digits` is a weight unless what
/// precedes it is a bare taxonomy code, so `taxon:9606` is a taxid of
/// weight 1 while `9606:3` and `taxon:9606:3` carry a weight of 3.
pub fn parse_observation(text: &str) -> anyhow::Result<(String, u64)> {
    let text = text.trim();
    anyhow::ensure!(!text.is_empty(), "empty observation");
    match WEIGHTED_TAXID.captures(text) {
        Some(captures) if !BARE_CODE.is_match(&captures[1]) => {
            let weight = captures[2]
                .parse()
                .with_context(|| format!("weight of `{}` is out of range", text))?;
            Ok((captures[1].to_string(), weight))
        }
        _ => Ok((text.to_string(), 1)),
    }
}

fn resolve<'a>(
    taxonomy: &'a Taxonomy,
    observations: &[String],
    strict: bool,
) -> anyhow::Result<Vec<(crate::Taxon<'a>, u64)>> {
    let mut weights = Vec::with_capacity(observations.len());
    for text in observations {
        let (taxid, weight) = parse_observation(text)?;
        match taxonomy.taxon(&taxid) {
            Ok((taxon, _)) => weights.push((taxon, weight)),
            Err(err) if strict => return Err(err.into()),
            Err(err) => warn!("{}", err),
        }
    }
    Ok(weights)
}

pub fn run(args: LcaArgs, config: Option<PathBuf>) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.threshold > 0.0 && args.threshold <= 1.0,
        "--threshold must lie in (0, 1]"
    );
    let ctx = build_context(config.as_deref(), &PipelineArgs::default(), Some(&args.taxonomy))?;
    let taxonomy = ctx.taxonomy()?;
    let weights = resolve(taxonomy, &args.observations, ctx.fail_on_taxonomy)?;

    let result = weighted_lca(&weights, args.threshold);
    let answer = result
        .taxon
        .map_or_else(|| "NA".to_string(), |t| t.string());
    println!(
        "{}\t{}\t{}",
        answer.bold(),
        crate::bio::annotation::format_float(result.purity),
        result.weight
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_observation() {
        assert_eq!(parse_observation("9606:3").unwrap(), ("9606".to_string(), 3));
        assert_eq!(parse_observation("9606").unwrap(), ("9606".to_string(), 1));
        assert_eq!(parse_observation("taxon:9606:12").unwrap(), ("taxon:9606".to_string(), 12));
        assert_eq!(parse_observation("taxon:9606").unwrap(), ("taxon:9606".to_string(), 1));
    }
}
