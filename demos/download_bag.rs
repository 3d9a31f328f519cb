use anyhow::{Context, Result};
use hsclient::{HydroShare, Overwrite, ResourceFilter};
use std::path::Path;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure the server and credentials via HS_* env vars or a `.hsrc` file.
    let hs = HydroShare::from_env()?.with_progress(true);

    let filter = ResourceFilter::new()
        .types(["CompositeResource"])
        .full_text_search("snow")
        .count(25);

    let first = hs
        .get_resource_list(&filter)?
        .next()
        .context("no resource matched the filter")??;
    let pid = first["resource_id"]
        .as_str()
        .context("resource listing without resource_id")?;

    let path = hs.get_resource(pid, Path::new("."), Some(Overwrite::Skip))?;
    println!("{}", path.display());
    Ok(())
}
