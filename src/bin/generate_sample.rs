use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const DT: f64 = 0.1;
const FUEL_CHANNELS: usize = 8;
/// Ground-truth weights for `[1, q, q·α]`, q = v²·p/T.
const TRUE_WEIGHTS: [f64; 3] = [41_000.0, 0.002, 0.0004];
const FUEL_BIAS: f64 = 8506.0 * 4.448221628254617;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One recorded flight: channel names and aligned columns.
struct Flight {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

/// Speed schedule: `(target speed m/s, hold seconds)`, ramps at `accel` m/s².
fn speed_profile(legs: &[(f64, f64)], accel: f64) -> Vec<f64> {
    let mut speed = vec![5.0];
    let mut v = 5.0;
    for &(target, hold) in legs {
        while (target - v).abs() > 1e-9 {
            let step = (target - v).clamp(-accel * DT, accel * DT);
            v += step;
            speed.push(v);
        }
        let samples = (hold / DT).round() as usize;
        speed.extend(std::iter::repeat(target).take(samples));
    }
    speed
}

fn simulate(legs: &[(f64, f64)], pressure_pa: f64, temperature_k: f64, rng: &mut SimpleRng) -> Flight {
    let speed = speed_profile(legs, 0.8);
    let n = speed.len();

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n); 5 + FUEL_CHANNELS];
    for (i, &v) in speed.iter().enumerate() {
        let t = i as f64 * DT;
        let p = pressure_pa * (1.0 + 0.02 * (t / 400.0).sin());
        let temp = temperature_k + 1.5 * (t / 250.0).cos();
        let q = v * v * p / temp;
        let alpha = 1.5 + 4.0e6 / q.max(1.0e5) * (1.0 + 0.15 * (t / 35.0).sin()) + rng.gauss(0.0, 0.02);

        let model = TRUE_WEIGHTS[0] + TRUE_WEIGHTS[1] * q + TRUE_WEIGHTS[2] * q * alpha;
        let total = model - FUEL_BIAS + rng.gauss(0.0, 25.0);

        columns[0].push(t);
        columns[1].push(v);
        columns[2].push(p);
        columns[3].push(temp);
        columns[4].push(alpha);
        for k in 0..FUEL_CHANNELS {
            columns[5 + k].push(total / FUEL_CHANNELS as f64);
        }
    }

    let mut names: Vec<String> = [
        "_zulu,_time",
        "true air speed",
        "ambient pressure",
        "ambient temperature",
        "angle of attack",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    names.extend((1..=FUEL_CHANNELS).map(|k| format!("fuel {k}")));

    Flight { names, columns }
}

fn write_delimited(path: &Path, flight: &Flight) {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'|')
        .from_path(path)
        .expect("Failed to create output file");
    writer.write_record(&flight.names).expect("Failed to write header");
    let rows = flight.columns[0].len();
    for r in 0..rows {
        let record: Vec<String> = flight.columns.iter().map(|c| format!("{:.6}", c[r])).collect();
        writer.write_record(&record).expect("Failed to write row");
    }
    writer.flush().expect("Failed to flush writer");
}

fn write_parquet(path: &Path, flight: &Flight) {
    let schema = Arc::new(Schema::new(
        flight
            .names
            .iter()
            .map(|name| Field::new(name, DataType::Float64, false))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = flight
        .columns
        .iter()
        .map(|c| Arc::new(Float64Array::from(c.clone())) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays).expect("Failed to create RecordBatch");

    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn main() {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir).expect("Failed to create output directory");

    let mut rng = SimpleRng::new(42);

    // (file stem, speed legs, pressure Pa, temperature K)
    let flights: [(&str, &[(f64, f64)], f64, f64); 3] = [
        ("high_power", &[(125.0, 150.0), (115.0, 120.0), (3.0, 10.0)], 57_000.0, 255.0),
        ("medium_power", &[(105.0, 150.0), (98.0, 120.0), (3.0, 10.0)], 62_000.0, 260.0),
        ("low_power", &[(88.0, 150.0), (82.0, 120.0), (3.0, 10.0)], 70_000.0, 268.0),
    ];

    for (stem, legs, pressure, temperature) in flights {
        let flight = simulate(legs, pressure, temperature, &mut rng);
        let txt = out_dir.join(format!("{stem}.txt"));
        write_delimited(&txt, &flight);
        let pq = out_dir.join(format!("{stem}.parquet"));
        write_parquet(&pq, &flight);
        println!(
            "Wrote {} samples ({} channels) to {} and {}",
            flight.columns[0].len(),
            flight.names.len(),
            txt.display(),
            pq.display()
        );
    }

    let config = serde_json::json!({
        "train_files": ["high_power.txt", "medium_power.txt"],
        "test_files": ["low_power.parquet"],
        "segmentation": { "accel_tolerance": 0.01, "min_speed": 10.0, "min_length": 200 },
        "save_model": "models/fuel_flow.json"
    });
    let config_path = out_dir.join("sample_run.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&config).expect("Failed to serialize config"),
    )
    .expect("Failed to write config");
    println!("Wrote run configuration to {}", config_path.display());
}
