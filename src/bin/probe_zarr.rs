use anyhow::{bail, Context};
use ekman::chunked::{ChunkedStore, RemoteZarrStore};
use ekman::dimensions::resolve_dimension_roles;
use ekman::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let mut args = std::env::args().skip(1);
    let (url, variable) = match (args.next(), args.next()) {
        (Some(url), Some(variable)) => (url, variable),
        _ => bail!("usage: probe_zarr <store-url> <variable>"),
    };

    println!("Probing zarr store: {}", url);
    println!("Variable: {}", variable);

    let store = RemoteZarrStore::new();
    let array = store
        .open(&url, &variable)
        .await
        .context("failed to open array")?;

    println!("\n=== ARRAY INFORMATION ===");

    let shape = array.shape();
    println!("\nShape: {:?}", shape);

    match array.dimension_names() {
        Some(dims) => {
            println!("\nDimensions:");
            for (name, extent) in dims.iter().zip(&shape) {
                println!("  {} = {}", name, extent);
            }

            println!("\nResolved roles:");
            let roles = resolve_dimension_roles(&dims);
            for (role, dim) in &roles {
                println!("  {:?} -> {} (axis {})", role, dim.name, dim.index);
            }
        }
        None => println!("\nNo dimension metadata (_ARRAY_DIMENSIONS missing)"),
    }

    let origin = vec![0; shape.len()];
    match array.read_scalar(&origin).await {
        Ok(value) => println!("\nFirst value: {}", value),
        Err(e) => println!("\nError reading first value: {}", e),
    }

    Ok(())
}
