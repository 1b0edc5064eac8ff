//! Sample Invoice Generator
//!
//! Writes synthetic extracted invoices as JSON lines for driving `invoice-guard`.
//! The stream mixes clean invoices with exact resubmissions, OCR-confused
//! invoice numbers, inflated amounts and malformed amounts.

use anyhow::Result;
use clap::Parser;
use invoice_guard::config::DEFAULT_MODEL;
use invoice_guard::{IncomingInvoice, InvoiceFields};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{BufWriter, Write};
use tracing::info;

const VENDORS: &[(&str, f64)] = &[
    ("Acme Corp", 1_200.0),
    ("Globex Industries", 450.0),
    ("Initech Supplies", 89.0),
    ("Umbrella Logistics", 3_400.0),
    ("Stark Components", 15_000.0),
];

#[derive(Parser, Debug)]
#[command(name = "sample-invoices", about = "Generate synthetic invoice JSON lines")]
struct Args {
    /// Number of invoices to generate
    #[arg(long, default_value_t = 100)]
    count: u64,

    /// Embedding dimension
    #[arg(long, default_value_t = 384)]
    dim: usize,

    /// RNG seed, random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

/// Kind of invoice emitted on each draw
#[derive(Debug, Clone, Copy)]
enum SampleKind {
    Clean,
    Resubmission,
    OcrConfused,
    Inflated,
    MalformedAmount,
}

/// Synthetic invoice generator
struct InvoiceGenerator {
    rng: StdRng,
    dim: usize,
    counter: u64,
    history: Vec<IncomingInvoice>,
}

impl InvoiceGenerator {
    fn new(seed: u64, dim: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            dim: dim.max(1),
            counter: 0,
            history: Vec::new(),
        }
    }

    fn pick_kind(&mut self) -> SampleKind {
        if self.history.len() < VENDORS.len() * 2 {
            return SampleKind::Clean;
        }
        match self.rng.gen_range(0..100) {
            0..=69 => SampleKind::Clean,
            70..=79 => SampleKind::Resubmission,
            80..=87 => SampleKind::OcrConfused,
            88..=94 => SampleKind::Inflated,
            _ => SampleKind::MalformedAmount,
        }
    }

    /// Generate the next invoice as a JSON value
    fn next(&mut self) -> Result<(SampleKind, serde_json::Value)> {
        let kind = self.pick_kind();
        let invoice = match kind {
            SampleKind::Clean | SampleKind::MalformedAmount => self.clean(),
            SampleKind::Resubmission => self.previous(),
            SampleKind::OcrConfused => {
                let mut invoice = self.previous();
                if let Some(number) = invoice.fields.invoice_number.as_mut() {
                    *number = ocr_confuse(number);
                }
                if let Some(embedding) = invoice.embedding.as_mut() {
                    embedding.vector = self.perturb(&embedding.vector, 0.05);
                }
                invoice
            }
            SampleKind::Inflated => {
                let mut invoice = self.clean();
                let factor = self.rng.gen_range(4.0..12.0);
                invoice.fields.total_amount = invoice.fields.total_amount.map(|a| round_cents(a * factor));
                invoice
            }
        };

        if matches!(kind, SampleKind::Clean | SampleKind::Inflated) {
            self.history.push(invoice.clone());
        }

        let mut value = serde_json::to_value(&invoice)?;
        if matches!(kind, SampleKind::MalformedAmount) {
            if let Some(amount) = invoice.fields.total_amount {
                let garbled = format!("{:.2}", amount).replace('0', "O");
                value["total_amount"] = serde_json::Value::String(format!("${garbled}"));
            }
        }
        Ok((kind, value))
    }

    fn clean(&mut self) -> IncomingInvoice {
        self.counter += 1;
        let (vendor, typical) = VENDORS[self.rng.gen_range(0..VENDORS.len())];
        let amount = round_cents(typical * self.rng.gen_range(0.8..1.2));
        let number = format!("INV-{}", 1000 + self.counter);
        let date = format!(
            "2024-{:02}-{:02}",
            self.rng.gen_range(1..=12),
            self.rng.gen_range(1..=28)
        );

        let mut fields = InvoiceFields::new(vendor, &number, amount)
            .with_date(&date)
            .with_raw_text(&format!("{} INVOICE {} TOTAL {:.2}", vendor.to_uppercase(), number, amount));
        fields.currency = Some("USD".to_string());
        fields.source_file = Some(format!("scan_{:05}.pdf", self.counter));

        let vector = self.unit_vector();
        IncomingInvoice::new(fields).with_embedding(DEFAULT_MODEL, vector)
    }

    fn previous(&mut self) -> IncomingInvoice {
        let index = self.rng.gen_range(0..self.history.len());
        self.history[index].clone()
    }

    fn unit_vector(&mut self) -> Vec<f32> {
        let raw: Vec<f32> = (0..self.dim).map(|_| self.rng.gen_range(-1.0..1.0)).collect();
        normalize(raw)
    }

    fn perturb(&mut self, vector: &[f32], noise: f32) -> Vec<f32> {
        let raw: Vec<f32> = vector
            .iter()
            .map(|&x| x + self.rng.gen_range(-noise..noise))
            .collect();
        normalize(raw)
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// Swap digits for the letters OCR commonly mistakes them for
fn ocr_confuse(number: &str) -> String {
    number
        .chars()
        .map(|c| match c {
            '0' => 'O',
            '1' => 'l',
            '5' => 'S',
            other => other,
        })
        .collect()
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(count = args.count, dim = args.dim, seed, "Generating sample invoices");

    let mut generator = InvoiceGenerator::new(seed, args.dim);
    let mut out = BufWriter::new(std::io::stdout().lock());
    let mut tallies = [0u64; 5];

    for _ in 0..args.count {
        let (kind, value) = generator.next()?;
        tallies[kind as usize] += 1;
        serde_json::to_writer(&mut out, &value)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(
        clean = tallies[SampleKind::Clean as usize],
        resubmissions = tallies[SampleKind::Resubmission as usize],
        ocr_confused = tallies[SampleKind::OcrConfused as usize],
        inflated = tallies[SampleKind::Inflated as usize],
        malformed = tallies[SampleKind::MalformedAmount as usize],
        "Completed"
    );

    Ok(())
}
