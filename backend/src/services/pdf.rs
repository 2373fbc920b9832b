//! In-process PDF generation for quotations and invoices
//!
//! Documents are built directly with lopdf and written under the uploads
//! directory, which is served at /uploads. Callers get back both the public
//! URL (stored on the row) and the raw bytes (attached to outgoing email).

use haulbase_shared::{Company, Customer, Invoice, PricingMethod, Quotation};
use lopdf::{dictionary, Document, Object, Stream};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

type PdfResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone)]
pub struct StoredPdf {
    /// Public URL path, e.g. "/uploads/quotations/q-1001-signed.pdf"
    pub url: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PdfService {
    uploads_dir: PathBuf,
}

impl PdfService {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
        }
    }

    /// Render a quotation document. `signed` adds the signature block.
    pub async fn store_quotation_pdf(
        &self,
        quotation: &Quotation,
        customer: &Customer,
        company: &Company,
        signed: bool,
    ) -> PdfResult<StoredPdf> {
        let bytes = render_quotation(quotation, customer, company, signed)?;
        let number = quotation.quote_number.unwrap_or(0);
        let filename = if signed {
            format!("q-{}-signed.pdf", number)
        } else {
            format!("q-{}.pdf", number)
        };
        self.store("quotations", &filename, bytes).await
    }

    pub async fn store_invoice_pdf(
        &self,
        invoice: &Invoice,
        customer: &Customer,
        company: &Company,
    ) -> PdfResult<StoredPdf> {
        let bytes = render_invoice(invoice, customer, company)?;
        let filename = format!("inv-{}.pdf", invoice.invoice_number);
        self.store("invoices", &filename, bytes).await
    }

    async fn store(&self, subdir: &str, filename: &str, bytes: Vec<u8>) -> PdfResult<StoredPdf> {
        let dir = self.uploads_dir.join(subdir);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(filename), &bytes).await?;

        Ok(StoredPdf {
            url: format!("/uploads/{}/{}", subdir, filename),
            bytes,
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }
}

fn money(value: Decimal) -> String {
    format!("${:.2}", value)
}

/// Build the text lines for a quotation document.
fn quotation_lines(
    quotation: &Quotation,
    customer: &Customer,
    company: &Company,
    signed: bool,
) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(company.name.clone());
    if let Some(address) = &company.address {
        lines.push(address.clone());
    }
    lines.push(String::new());
    lines.push(format!(
        "QUOTATION #{}",
        quotation
            .quote_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "DRAFT".to_string())
    ));
    lines.push(String::new());
    lines.push(format!("Customer: {}", customer.full_name));
    if let Some(email) = &customer.email {
        lines.push(format!("Email: {}", email));
    }
    if let Some(phone) = &customer.phone {
        lines.push(format!("Phone: {}", phone));
    }
    lines.push(String::new());

    if let Some(service_type) = &quotation.service_type {
        lines.push(format!("Service: {}", service_type));
    }
    if let Some(date) = quotation.moving_date {
        lines.push(format!("Moving date: {}", date));
    }
    if let Some(time) = &quotation.start_time {
        lines.push(format!("Start time: {}", time));
    }
    if let Some(hours) = quotation.estimated_hours {
        lines.push(format!("Estimated duration: {} hours", hours));
    }
    lines.push(format!(
        "Crew: {} workers, {} truck(s){}",
        quotation.workers,
        quotation.trucks,
        quotation
            .truck_size
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default()
    ));
    lines.push(String::new());

    if let Some(pickup) = &quotation.pickup_address {
        lines.push(format!("From: {}", pickup));
    }
    if let Some(dropoff) = &quotation.dropoff_address {
        lines.push(format!("To: {}", dropoff));
    }
    lines.push(String::new());

    match quotation.pricing_method {
        PricingMethod::Hourly => {
            if let Some(rate) = quotation.hourly_rate {
                lines.push(format!("Rate: {}/hour", money(rate)));
            }
        }
        PricingMethod::Fixed => {
            if let Some(price) = quotation.fixed_price {
                lines.push(format!("Fixed price: {}", money(price)));
            }
        }
    }
    if let Some(travel) = quotation.travel_cost {
        if travel > Decimal::ZERO {
            lines.push(format!("Travel cost: {}", money(travel)));
        }
    }
    if let Some(materials) = quotation.materials_cost {
        if materials > Decimal::ZERO {
            lines.push(format!("Materials: {}", money(materials)));
        }
    }
    if let Some(discount) = quotation.discount {
        if discount > Decimal::ZERO {
            lines.push(format!("Discount: -{}", money(discount)));
        }
    }
    lines.push(format!("TOTAL: {}", money(quotation.total)));
    lines.push(String::new());

    if let Some(volume) = quotation.estimated_volume_cft {
        lines.push(format!("Estimated volume: {} cu ft", volume));
    }
    if let Some(items) = quotation.inventory_items {
        lines.push(format!("Inventory items: {}", items));
    }
    if let Some(terms) = &quotation.terms_text {
        lines.push(String::new());
        lines.push("Terms and conditions".to_string());
        for term_line in terms.lines() {
            lines.push(term_line.to_string());
        }
    }

    if signed {
        lines.push(String::new());
        lines.push("--- SIGNED ---".to_string());
        if let Some(signed_by) = &quotation.signed_by {
            lines.push(format!("Signed by: {}", signed_by));
        }
        if let Some(signed_at) = quotation.signed_at {
            lines.push(format!("Signed at: {}", signed_at.format("%Y-%m-%d %H:%M UTC")));
        }
        if let Some(ip) = &quotation.signed_ip {
            lines.push(format!("IP address: {}", ip));
        }
    }

    lines
}

/// Build the text lines for an invoice document.
fn invoice_lines(invoice: &Invoice, customer: &Customer, company: &Company) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(company.name.clone());
    if let Some(address) = &company.address {
        lines.push(address.clone());
    }
    lines.push(String::new());
    lines.push(format!("INVOICE #{}", invoice.invoice_number));
    lines.push(format!("Issued: {}", invoice.issued_at.format("%Y-%m-%d")));
    if let Some(due) = invoice.due_at {
        lines.push(format!("Due: {}", due.format("%Y-%m-%d")));
    }
    lines.push(String::new());
    lines.push(format!("Bill to: {}", customer.full_name));
    lines.push(String::new());

    if let Some(items) = invoice.items.as_array() {
        for item in items {
            let description = item
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("Item");
            let quantity = item.get("quantity").and_then(|v| v.as_f64()).unwrap_or(1.0);
            let amount = item.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
            lines.push(format!("{} x{} ... ${:.2}", description, quantity, amount));
        }
    }

    lines.push(String::new());
    lines.push(format!("Subtotal: {}", money(invoice.subtotal)));
    lines.push(format!("TPS (5%): {}", money(invoice.tax_tps)));
    lines.push(format!("TVQ (9.975%): {}", money(invoice.tax_tvq)));
    lines.push(format!("TOTAL: {}", money(invoice.total)));

    if let Some(notes) = &invoice.notes {
        lines.push(String::new());
        for note_line in notes.lines() {
            lines.push(note_line.to_string());
        }
    }

    lines
}

pub fn render_quotation(
    quotation: &Quotation,
    customer: &Customer,
    company: &Company,
    signed: bool,
) -> PdfResult<Vec<u8>> {
    build_pdf(&quotation_lines(quotation, customer, company, signed))
}

pub fn render_invoice(
    invoice: &Invoice,
    customer: &Customer,
    company: &Company,
) -> PdfResult<Vec<u8>> {
    build_pdf(&invoice_lines(invoice, customer, company))
}

/// Assemble a single-column PDF, one page per 55 lines, US Letter.
fn build_pdf(lines: &[String]) -> PdfResult<Vec<u8>> {
    const LINES_PER_PAGE: usize = 55;

    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    for chunk in chunks {
        let content = format_page(chunk);
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.into_bytes(),
        )));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| format!("PDF serialization failed: {}", e))?;

    Ok(buffer)
}

fn format_page(lines: &[String]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str("/F1 11 Tf\n");
    content.push_str("50 742 Td\n");
    content.push_str("13 TL\n");

    for line in lines {
        let escaped = escape_pdf_string(line);
        content.push_str(&format!("({}) Tj T*\n", escaped));
    }

    content.push_str("ET\n");
    content
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("a(b)c"), "a\\(b\\)c");
        assert_eq!(escape_pdf_string("back\\slash"), "back\\\\slash");
        assert_eq!(escape_pdf_string("café"), "caf ");
    }

    #[test]
    fn test_build_pdf_produces_document() {
        let lines = vec!["QUOTATION #1001".to_string(), "Total: $450.00".to_string()];
        let bytes = build_pdf(&lines).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_build_pdf_paginates() {
        let lines: Vec<String> = (0..120).map(|i| format!("line {}", i)).collect();
        let bytes = build_pdf(&lines).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[tokio::test]
    async fn test_store_writes_under_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let service = PdfService::new(dir.path());

        let stored = service
            .store("quotations", "q-1001.pdf", b"%PDF-1.5 test".to_vec())
            .await
            .unwrap();

        assert_eq!(stored.url, "/uploads/quotations/q-1001.pdf");
        assert!(dir.path().join("quotations/q-1001.pdf").exists());
    }
}
