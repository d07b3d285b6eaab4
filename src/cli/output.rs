use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::hierarchy::AncestorChain;
use crate::models::{EntityId, LicenseAllotment};

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": false,
                "error": message
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

pub fn output_chain(output_format: &OutputFormat, chain: &AncestorChain) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": true,
                "chain": chain,
                "assignment": chain.to_assignment(),
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            // Leaf first, platform root last
            for link in chain.links() {
                println!("L{}  {:<9} {}", link.level, format!("{:?}", link.tier()).to_lowercase(), link.id);
            }
        }
    }
    Ok(())
}

pub fn output_allotments(
    output_format: &OutputFormat,
    entity_id: EntityId,
    allotments: &[LicenseAllotment],
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": true,
                "entity_id": entity_id,
                "allotments": allotments,
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text if allotments.is_empty() => {
            println!("Entity {} has no licence allotments", entity_id);
        }
        OutputFormat::Text => {
            println!("{:<22} {:>10} {:>10} {:>10}", "KIND", "GRANTED", "CONSUMED", "REMAINING");
            for allotment in allotments {
                println!(
                    "{:<22} {:>10} {:>10} {:>10}",
                    allotment.kind.as_str(),
                    allotment.granted,
                    allotment.consumed,
                    allotment.remaining()
                );
            }
        }
    }
    Ok(())
}
