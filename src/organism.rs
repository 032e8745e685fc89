use nalgebra::{SMatrix, SVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::controller::{Controller, Sensors, SENSOR_COUNT};

// --- Network Shape ---
pub const HIDDEN_NEURONS: usize = 4;

const HIDDEN_WEIGHTS: usize = HIDDEN_NEURONS * SENSOR_COUNT;
const HIDDEN_BIASES: usize = HIDDEN_NEURONS;
const OUTPUT_WEIGHTS: usize = HIDDEN_NEURONS;
pub const GENE_COUNT: usize = HIDDEN_WEIGHTS + HIDDEN_BIASES + OUTPUT_WEIGHTS + 1;

// --- Gene Range Constants ---
pub const MIN_GENE: f32 = -30.0;
pub const MAX_GENE: f32 = 30.0;

// --- Chromosome ---

/// Flat weight genes, laid out as hidden weights (row-major, one row per
/// hidden neuron), hidden biases, output weights, output bias.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    pub genes: [f32; GENE_COUNT],
}

impl Chromosome {
    pub fn new_random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut genes = [0.0; GENE_COUNT];
        for gene in &mut genes {
            let value: f32 = rng.sample(StandardNormal);
            *gene = value.clamp(MIN_GENE, MAX_GENE);
        }
        Self { genes }
    }

    fn hidden_weights(&self) -> &[f32] {
        &self.genes[..HIDDEN_WEIGHTS]
    }

    fn hidden_biases(&self) -> &[f32] {
        &self.genes[HIDDEN_WEIGHTS..HIDDEN_WEIGHTS + HIDDEN_BIASES]
    }

    fn output_weights(&self) -> &[f32] {
        let start = HIDDEN_WEIGHTS + HIDDEN_BIASES;
        &self.genes[start..start + OUTPUT_WEIGHTS]
    }

    fn output_bias(&self) -> f32 {
        self.genes[GENE_COUNT - 1]
    }
}

// --- Brain (phenotype) ---

/// Feed-forward network with one tanh hidden layer and a tanh output.
#[derive(Debug, Clone, PartialEq)]
pub struct Brain {
    hidden_weights: SMatrix<f32, HIDDEN_NEURONS, SENSOR_COUNT>,
    hidden_biases: SVector<f32, HIDDEN_NEURONS>,
    output_weights: SVector<f32, HIDDEN_NEURONS>,
    output_bias: f32,
}

impl Brain {
    pub fn from_chromosome(chromosome: &Chromosome) -> Self {
        Self {
            hidden_weights: SMatrix::from_row_slice(chromosome.hidden_weights()),
            hidden_biases: SVector::from_column_slice(chromosome.hidden_biases()),
            output_weights: SVector::from_column_slice(chromosome.output_weights()),
            output_bias: chromosome.output_bias(),
        }
    }

    pub fn activate(&self, sensors: &Sensors) -> f32 {
        let input = SVector::<f32, SENSOR_COUNT>::from_column_slice(sensors);
        let hidden = (self.hidden_weights * input + self.hidden_biases).map(f32::tanh);
        (self.output_weights.dot(&hidden) + self.output_bias).tanh()
    }
}

impl Controller for Brain {
    fn decide(&self, sensors: &Sensors) -> f32 {
        self.activate(sensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Action;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn create_random_chromosome() {
        let mut rng = StdRng::seed_from_u64(5);
        let chromosome = Chromosome::new_random(&mut rng);
        assert_eq!(GENE_COUNT, 21);
        assert!(chromosome.genes.iter().all(|gene| (MIN_GENE..=MAX_GENE).contains(gene)));
        assert!(chromosome.genes.iter().any(|&gene| gene != 0.0));
    }

    #[test]
    fn zero_genes_output_zero() {
        let brain = Brain::from_chromosome(&Chromosome { genes: [0.0; GENE_COUNT] });
        assert_eq!(brain.decide(&[350.0, 50.0, 150.0]), 0.0);
    }

    #[test]
    fn output_bias_alone_drives_decision() {
        let mut genes = [0.0; GENE_COUNT];
        genes[GENE_COUNT - 1] = 3.0;
        let brain = Brain::from_chromosome(&Chromosome { genes });
        let signal = brain.decide(&[600.0, 0.0, 0.0]);
        assert!((signal - 3.0_f32.tanh()).abs() < 1e-6);
        assert_eq!(Action::from_signal(signal), Action::Flap);
    }

    #[test]
    fn gene_layout_maps_to_network() {
        let mut genes = [0.0; GENE_COUNT];
        // First hidden neuron reads the second sensor only.
        genes[1] = 0.01;
        // Its output weight.
        genes[HIDDEN_WEIGHTS + HIDDEN_BIASES] = 2.0;
        let brain = Brain::from_chromosome(&Chromosome { genes });

        let sensors = [350.0, 50.0, 150.0];
        let expected = (2.0 * (0.01_f32 * 50.0).tanh()).tanh();
        assert!((brain.decide(&sensors) - expected).abs() < 1e-6);
        assert_eq!(brain.decide(&[350.0, 0.0, 150.0]), 0.0);
    }

    #[test]
    fn brain_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(8);
        let brain = Brain::from_chromosome(&Chromosome::new_random(&mut rng));
        let sensors = [412.0, 37.5, 162.5];
        let first = brain.decide(&sensors);
        assert!(first.is_finite());
        assert!((-1.0..=1.0).contains(&first));
        for _ in 0..10 {
            assert_eq!(brain.decide(&sensors), first);
        }
    }
}
