use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use atelier_clients::Client;
use atelier_invoicing::Invoice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("invoice {0} has not been issued")]
    NotIssued(String),

    #[error("render failed: {0}")]
    Failed(String),
}

/// Turns an issued invoice into a deliverable document.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, invoice: &Invoice, client: &Client) -> Result<RenderedDocument, RenderError>;
}

impl<R> DocumentRenderer for Arc<R>
where
    R: DocumentRenderer + ?Sized,
{
    fn render(&self, invoice: &Invoice, client: &Client) -> Result<RenderedDocument, RenderError> {
        (**self).render(invoice, client)
    }
}

/// Fixed-width text rendering of the frozen invoice lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

const WIDTH: usize = 60;

impl DocumentRenderer for PlainTextRenderer {
    fn render(&self, invoice: &Invoice, client: &Client) -> Result<RenderedDocument, RenderError> {
        let Some(period) = invoice.period().filter(|_| invoice.is_issued()) else {
            return Err(RenderError::NotIssued(invoice.id_typed().to_string()));
        };

        let mut out = String::new();
        let mut line = |text: String| -> Result<(), RenderError> {
            writeln!(out, "{text}").map_err(|e| RenderError::Failed(e.to_string()))
        };

        line(format!("INVOICE {}", invoice.number()))?;
        line(format!("Period: {period}"))?;
        if let Some(issued_at) = invoice.issued_at() {
            line(format!("Issued: {}", issued_at.format("%Y-%m-%d")))?;
        }
        line(format!("Bill to: {} (tax id {})", client.name(), client.tax_id()))?;
        line("-".repeat(WIDTH))?;

        for invoice_line in invoice.lines() {
            line(format!("Job {}", invoice_line.reference))?;
            for component in &invoice_line.components {
                line(format!(
                    "  {:<44}{:>14}",
                    component.description,
                    component.amount.to_string()
                ))?;
            }
            line(format!("  {:<44}{:>14}", "Line total", invoice_line.line_total.to_string()))?;
        }

        line("-".repeat(WIDTH))?;
        line(format!("{:<46}{:>14}", "Total excl. tax", invoice.total_ht().to_string()))?;
        line(format!(
            "{:<46}{:>14}",
            format!("Total incl. tax ({}%)", invoice.tax_rate_percent()),
            invoice.total_ttc().to_string()
        ))?;
        line(format!("Catalog version {}", invoice.catalog_version()))?;

        Ok(RenderedDocument {
            file_name: format!("{}.txt", invoice.number()),
            content_type: "text/plain; charset=utf-8".to_string(),
            bytes: out.into_bytes(),
        })
    }
}
